//! Structured event definitions for logging.
//!
//! Every pipeline event carries the correlation IDs (`run_id`, `burst_id`)
//! and the stage it was emitted from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Snapshot reading and sample cleaning.
    Ingest,
    /// Headway chains.
    Extract,
    /// Window building.
    Window,
    /// Distance scoring.
    Score,
    /// Series tracker update and sweep.
    Track,
    /// Episode filtering and logging.
    Emit,
    /// Output files.
    Persist,
    /// The watch loop.
    Daemon,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Ingest => "ingest",
            Stage::Extract => "extract",
            Stage::Window => "window",
            Stage::Score => "score",
            Stage::Track => "track",
            Stage::Emit => "emit",
            Stage::Persist => "persist",
            Stage::Daemon => "daemon",
        };
        f.write_str(s)
    }
}

/// Stable event names, used as tracing targets.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_MODEL_ISSUE: &str = "config.model_issue";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const HYPERPARAMS_FALLBACK: &str = "hyperparams.fallback";

    pub const BURST_STARTED: &str = "burst.started";
    pub const BURST_SKIPPED_UNCHANGED: &str = "burst.skipped_unchanged";
    pub const BURST_DEFERRED: &str = "burst.deferred";
    pub const BURST_FINISHED: &str = "burst.finished";

    pub const INGEST_CLEANED: &str = "ingest.cleaned";
    pub const INGEST_UNREADABLE: &str = "ingest.unreadable";

    pub const EXTRACT_DIRECTION_EMPTY: &str = "extract.direction_empty";
    pub const EXTRACT_SEGMENT_MISSING: &str = "extract.segment_missing";
    pub const EXTRACT_LINE_EMPTY: &str = "extract.line_empty";

    pub const SCORE_MISSING_SLICE: &str = "score.missing_slice";
    pub const SCORE_MISSING_MODEL: &str = "score.missing_model";
    pub const SCORE_SINGULAR_COVARIANCE: &str = "score.singular_covariance";

    pub const LINE_FAILED: &str = "line.failed";

    pub const TRACK_EPISODE_CLOSED: &str = "track.episode_closed";
    pub const TRACK_SWEPT: &str = "track.swept";

    pub const EMIT_REPORTABLE: &str = "emit.reportable";

    pub const STATE_LOADED: &str = "state.loaded";
    pub const STATE_RESET: &str = "state.reset";
    pub const PERSIST_FAILED: &str = "persist.failed";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation IDs shared by every event of a run.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    /// Set while a burst is being processed.
    pub burst_id: Option<String>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            burst_id: None,
            host_id: host_id.into(),
        }
    }

    pub fn with_burst_id(mut self, burst_id: impl Into<String>) -> Self {
        self.burst_id = Some(burst_id.into());
        self
    }
}
