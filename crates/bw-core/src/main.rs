//! bunchwatch CLI entry point.
//!
//! Detects bus bunching from live arrival snapshots:
//! - `watch`: poll a snapshot file and process each new burst
//! - `process`: process one snapshot and exit with an outcome code
//! - `check`: validate the configuration directory
//! - `report`: the current reportable anomaly view
//! - `hyperparams`: show or change per-line confidence and size threshold

use bw_common::error::format_error_human;
use bw_common::{Error, ErrorReport, LineId, OutputFormat};
use bw_config::{
    load_config, resolve_paths, ConfigFile, ConfigPaths, HyperparamSource, Hyperparams,
    LoadedConfig,
};
use bw_core::burst::{BurstOutcome, BurstReport, Detector};
use bw_core::daemon::{run_watch, ThreadSleeper, WatchConfig, WatchSummary};
use bw_core::emitter::current_view;
use bw_core::exit_codes::ExitCode;
use bw_core::ingest::Snapshot;
use bw_core::log_event;
use bw_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    LogLevel, Stage,
};
use bw_core::persist::{default_max_state_age, DataStore, RAW_ANOMALIES_FILE};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bunchwatch")]
#[command(about = "Bus bunching detector over live headways")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Directory holding topology, travel times, models and hyperparameters
    /// [env: BUNCHWATCH_CONFIG_DIR]
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Directory for series state, headways and anomaly logs [env: BUNCHWATCH_DATA]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format for stdout payloads
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Log format on stderr [env: BW_LOG_FORMAT]
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a snapshot file and process every new burst
    Watch(WatchArgs),

    /// Process a single snapshot
    Process(ProcessArgs),

    /// Load and validate the configuration
    Check,

    /// Show the current reportable anomalies
    Report(ReportArgs),

    /// Show or update per-line hyperparameters
    Hyperparams(HyperparamsArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Snapshot file written by the poller
    #[arg(long, env = "BUNCHWATCH_SNAPSHOT")]
    snapshot: PathBuf,

    /// Seconds between polls
    #[arg(long, default_value_t = 5)]
    poll_secs: u64,

    /// Seconds to wait when outside service hours
    #[arg(long, default_value_t = 120)]
    defer_secs: u64,

    /// Stop after this many polls
    #[arg(long)]
    max_bursts: Option<u64>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Snapshot file to process
    #[arg(long, env = "BUNCHWATCH_SNAPSHOT")]
    snapshot: PathBuf,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Only this line
    #[arg(long)]
    line: Option<String>,
}

#[derive(Args, Debug)]
struct HyperparamsArgs {
    #[command(subcommand)]
    command: HyperparamsCommand,
}

#[derive(Subcommand, Debug)]
enum HyperparamsCommand {
    /// Print the hyperparameter file
    Show,

    /// Change one line's values; unspecified values are kept
    Set {
        #[arg(long)]
        line: String,

        /// Chi-square confidence, strictly between 0 and 1
        #[arg(long)]
        confidence: Option<f64>,

        /// Minimum episode length to report
        #[arg(long)]
        size_threshold: Option<u32>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet);
    init_logging(&LogConfig::from_env(level, cli.global.log_format));
    let ctx = LogContext::new(generate_run_id(), get_host_id());

    let result = match &cli.command {
        Commands::Watch(args) => run_watch_cmd(&cli.global, &ctx, args),
        Commands::Process(args) => run_process(&cli.global, &ctx, args),
        Commands::Check => run_check(&cli.global, &ctx),
        Commands::Report(args) => run_report(&cli.global, &ctx, args),
        Commands::Hyperparams(args) => run_hyperparams(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            Ok(ExitCode::Clean)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(err) => {
            log_event!(ctx, ERROR, event_names::INTERNAL_ERROR, Stage::Init,
                "command failed", code = err.code(), error = %err);
            output_error(&cli.global, &err);
            ExitCode::for_error(&err)
        }
    };
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn paths(global: &GlobalOpts) -> ConfigPaths {
    resolve_paths(global.config_dir.as_deref(), global.data_dir.as_deref())
}

fn load(global: &GlobalOpts, ctx: &LogContext) -> Result<(LoadedConfig, DataStore), Error> {
    let paths = paths(global);
    let config = load_config(&paths).map_err(|err| {
        log_event!(ctx, ERROR, event_names::CONFIG_ERROR, Stage::Init,
            "configuration rejected", error = %err);
        err
    })?;
    log_event!(ctx, INFO, event_names::CONFIG_LOADED, Stage::Init,
        "configuration loaded",
        config_hash = %config.snapshot.short_id(),
        lines = config.snapshot.summary.lines.len(),
        model_slices = config.snapshot.summary.model_slices);
    for (line, slot, issue) in config.models.issues() {
        log_event!(ctx, WARN, event_names::CONFIG_MODEL_ISSUE, Stage::Init,
            "model dimension disabled", line = %line, slot = %slot, issue = %issue);
    }
    Ok((config, DataStore::new(paths.data_dir)))
}

/// Detector with persisted series state adopted when fresh.
fn detector(config: LoadedConfig, store: &DataStore, ctx: &LogContext) -> Result<Detector, Error> {
    let mut detector = Detector::new(config, ctx.clone());
    detector.restore(store, Utc::now(), default_max_state_age())?;
    Ok(detector)
}

fn hyperparams_path(global: &GlobalOpts) -> Result<PathBuf, Error> {
    let dir = paths(global)
        .config_dir
        .ok_or_else(|| Error::from(bw_config::ConfigError::NoConfigDir))?;
    Ok(dir.join(ConfigFile::Hyperparams.file_name()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn output_error(global: &GlobalOpts, err: &Error) {
    match global.format {
        OutputFormat::Json => eprintln!("{}", ErrorReport::from(err).to_json()),
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal()))
        }
    }
}

fn summary_line(report: &BurstReport) -> String {
    format!(
        "burst {}: {} samples kept, {} dropped, {} anomalous windows, {} episodes closed, {} reportable",
        report.burst_id,
        report.samples_kept,
        report.samples_dropped.values().sum::<usize>(),
        report.anomalous_windows,
        report.episodes_closed,
        report.reportable
    )
}

// ============================================================================
// Commands
// ============================================================================

fn run_process(global: &GlobalOpts, ctx: &LogContext, args: &ProcessArgs) -> Result<ExitCode, Error> {
    let (config, store) = load(global, ctx)?;
    let mut detector = detector(config, &store, ctx)?;
    let snapshot = Snapshot::read(&args.snapshot)?;

    let (status, code) = match detector.process(&snapshot) {
        BurstOutcome::Processed(output) => {
            detector.persist(&store, &output)?;
            let code = if output.report.reportable > 0 {
                ExitCode::AnomaliesReported
            } else {
                ExitCode::Clean
            };
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "status": "processed",
                    "report": output.report,
                }))?,
                OutputFormat::Summary => println!("{}", summary_line(&output.report)),
            }
            return Ok(code);
        }
        BurstOutcome::Unchanged => ("unchanged", ExitCode::Unchanged),
        BurstOutcome::OutsideServiceHours => ("outside_service_hours", ExitCode::OutsideServiceHours),
    };
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": status,
            "taken_at": snapshot.taken_at,
        }))?,
        OutputFormat::Summary => println!("{status}"),
    }
    Ok(code)
}

fn run_watch_cmd(global: &GlobalOpts, ctx: &LogContext, args: &WatchArgs) -> Result<ExitCode, Error> {
    let (config, store) = load(global, ctx)?;
    let mut detector = detector(config, &store, ctx)?;
    let watch = WatchConfig {
        snapshot_path: args.snapshot.clone(),
        poll_secs: args.poll_secs,
        defer_secs: args.defer_secs,
        max_bursts: args.max_bursts,
    };

    let summary: WatchSummary = run_watch(&mut detector, &store, &watch, &mut ThreadSleeper);
    match global.format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Summary => println!(
            "{} polls: {} processed, {} unchanged, {} deferred, {} unreadable, {} reportable",
            summary.polls,
            summary.processed,
            summary.unchanged,
            summary.deferred,
            summary.unreadable,
            summary.reportable
        ),
    }
    Ok(if summary.reportable > 0 {
        ExitCode::AnomaliesReported
    } else {
        ExitCode::Clean
    })
}

fn run_check(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode, Error> {
    let (config, _store) = load(global, ctx)?;
    let issues: Vec<serde_json::Value> = config
        .models
        .issues()
        .into_iter()
        .map(|(line, slot, issue)| {
            serde_json::json!({
                "line": line,
                "slot": slot.to_string(),
                "issue": issue.to_string(),
            })
        })
        .collect();

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "ok",
            "config": config.snapshot,
            "model_issues": issues,
        }))?,
        OutputFormat::Summary => {
            let s = &config.snapshot.summary;
            println!(
                "config {} ok: {} lines, {} travel segments, {} model slices, {} model issues",
                config.snapshot.short_id(),
                s.lines.len(),
                s.travel_segments,
                s.model_slices,
                issues.len()
            );
        }
    }
    Ok(ExitCode::Clean)
}

fn run_report(global: &GlobalOpts, ctx: &LogContext, args: &ReportArgs) -> Result<ExitCode, Error> {
    let store = DataStore::new(paths(global).data_dir);
    let (events, skipped) = store.read_anomalies(RAW_ANOMALIES_FILE)?;
    if skipped > 0 {
        log_event!(ctx, WARN, event_names::INGEST_UNREADABLE, Stage::Emit,
            "skipped unreadable anomaly log lines", skipped = skipped);
    }

    let mut source = HyperparamSource::new(hyperparams_path(global)?);
    let read = source.refresh();
    if let Some(err) = &read.error {
        log_event!(ctx, WARN, event_names::HYPERPARAMS_FALLBACK, Stage::Emit,
            "hyperparameters unreadable, using defaults", error = %err);
    }

    let line = args.line.clone().map(LineId);
    let view = current_view(events, &read.values, line.as_ref());
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "anomalies": view,
            "count": view.len(),
            "hyperparams_origin": read.origin,
        }))?,
        OutputFormat::Summary => {
            println!("{} reportable anomalies", view.len());
            for event in &view {
                println!(
                    "  line {} dir {} buses {} len {} ended {}",
                    event.line,
                    event.direction.as_u8(),
                    event.bus_ids,
                    event.episode_length,
                    event.end_timestamp
                );
            }
        }
    }
    Ok(ExitCode::Clean)
}

fn run_hyperparams(global: &GlobalOpts, args: &HyperparamsArgs) -> Result<ExitCode, Error> {
    let path = hyperparams_path(global)?;
    let values = match &args.command {
        HyperparamsCommand::Show => Hyperparams::load(&path)?,
        HyperparamsCommand::Set {
            line,
            confidence,
            size_threshold,
        } => Hyperparams::update_line(&path, &LineId(line.clone()), *confidence, *size_threshold)?,
    };
    match global.format {
        OutputFormat::Json => print_json(&values)?,
        OutputFormat::Summary => {
            for (line, hp) in &values.0 {
                println!("{line}: conf {} size_th {}", hp.confidence, hp.size_threshold);
            }
        }
    }
    Ok(ExitCode::Clean)
}

fn print_version(global: &GlobalOpts) {
    let version = env!("CARGO_PKG_VERSION");
    match global.format {
        OutputFormat::Json => {
            let info = serde_json::json!({
                "bunchwatch_version": version,
                "config_schema_version": bw_config::CONFIG_SCHEMA_VERSION,
                "series_schema_version": bw_core::persist::SERIES_SCHEMA_VERSION,
            });
            println!("{info}");
        }
        OutputFormat::Summary => println!("bunchwatch {version}"),
    }
}
