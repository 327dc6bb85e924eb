//! Structured logging for bunchwatch.
//!
//! Two modes, both on stderr:
//! - human-readable console output for interactive use
//! - JSONL for the watch loop and for agents reading the logs
//!
//! ```ignore
//! use bw_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! init_logging(&LogConfig::from_env(None, None));
//! let ctx = LogContext::new(generate_run_id(), get_host_id());
//! bw_core::log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "watch started");
//! ```
//!
//! stdout is reserved for command payloads.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.level).into())
        .from_env_lossy();

    let result = match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

/// Unique ID for this invocation: `run-` plus 12 hex characters.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Stable host identifier from the machine id, else the hostname.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 {
            return format!("host-{}", &id[..8]);
        }
    }
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        let hash = bw_config::hash_content(&hostname);
        return format!("host-{}", &hash[..8]);
    }
    format!("host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Structured event with the context's correlation IDs.
///
/// ```ignore
/// log_event!(ctx, WARN, event_names::SCORE_MISSING_MODEL, Stage::Score,
///     "dimension skipped", line = %line, dimension = d);
/// ```
#[macro_export]
macro_rules! log_event {
    (@fields $mac:ident, $ctx:expr, $event:expr, $stage:expr, $msg:expr $(, $($fields:tt)+)?) => {
        tracing::$mac!(
            target: $event,
            run_id = %$ctx.run_id,
            burst_id = ?$ctx.burst_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = %$msg,
            $($($fields)+)?
        )
    };
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $($fields:tt)+)?) => {
        $crate::log_event!(@fields info, $ctx, $event, $stage, $msg $(, $($fields)+)?)
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $($fields:tt)+)?) => {
        $crate::log_event!(@fields debug, $ctx, $event, $stage, $msg $(, $($fields)+)?)
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $($fields:tt)+)?) => {
        $crate::log_event!(@fields warn, $ctx, $event, $stage, $msg $(, $($fields)+)?)
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $($fields:tt)+)?) => {
        $crate::log_event!(@fields error, $ctx, $event, $stage, $msg $(, $($fields)+)?)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_format() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn host_id_format() {
        let host = get_host_id();
        assert!(host.starts_with("host-"));
        assert!(host.len() >= 13);
    }

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Human);
        assert_eq!(config.level, LogLevel::Info);
    }
}
