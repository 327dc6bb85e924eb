//! Error types for bunchwatch.
//!
//! Every error carries a stable numeric code, a category, a recoverability
//! hint and a human remediation line. Codes are grouped by category:
//!
//! | Range | Category |
//! |-------|----------|
//! | 10-19 | configuration |
//! | 20-29 | snapshot ingest |
//! | 30-39 | model / scoring |
//! | 50-59 | persisted series state |
//! | 60-69 | I/O and serialization |
//!
//! Human-facing output:
//! ```text
//! ✗ Invalid Model Store
//!   Reason: invalid model store: line 44 slice LA/7-8 dimension 3: covariance is 2x2
//!   Fix: Re-export models.json from the trainer and run 'bunchwatch check'.
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for bunchwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    Ingest,
    Model,
    State,
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Ingest => write!(f, "ingest"),
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::State => write!(f, "state"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for bunchwatch.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid travel-time reference: {0}")]
    InvalidTravelTimes(String),

    #[error("invalid model store: {0}")]
    InvalidModels(String),

    #[error("invalid hyperparameters: {0}")]
    InvalidHyperparams(String),

    #[error("invalid service calendar: {0}")]
    InvalidCalendar(String),

    // Ingest errors (20-29)
    #[error("snapshot ingest failed: {0}")]
    Ingest(String),

    #[error("line {line} is not present in the topology")]
    UnknownLine { line: String },

    // Model / scoring errors (30-39)
    #[error("scoring failed: {0}")]
    Scoring(String),

    #[error("no model for line {line} slice {day_type}/{hour_range} dimension {dimension}")]
    MissingModel {
        line: String,
        day_type: String,
        hour_range: String,
        dimension: usize,
    },

    #[error("covariance for line {line} dimension {dimension} is singular or ill-conditioned")]
    SingularCovariance { line: String, dimension: usize },

    // State errors (50-59)
    #[error("series state corrupted: {0}")]
    StateCorrupted(String),

    #[error("series state is stale ({age_secs}s old)")]
    StateStale { age_secs: i64 },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable error code.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidTopology(_) => 11,
            Error::InvalidTravelTimes(_) => 12,
            Error::InvalidModels(_) => 13,
            Error::InvalidHyperparams(_) => 14,
            Error::InvalidCalendar(_) => 15,
            Error::Ingest(_) => 20,
            Error::UnknownLine { .. } => 21,
            Error::Scoring(_) => 30,
            Error::MissingModel { .. } => 31,
            Error::SingularCovariance { .. } => 32,
            Error::StateCorrupted(_) => 50,
            Error::StateStale { .. } => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::InvalidTopology(_)
            | Error::InvalidTravelTimes(_)
            | Error::InvalidModels(_)
            | Error::InvalidHyperparams(_)
            | Error::InvalidCalendar(_) => ErrorCategory::Config,

            Error::Ingest(_) | Error::UnknownLine { .. } => ErrorCategory::Ingest,

            Error::Scoring(_) | Error::MissingModel { .. } | Error::SingularCovariance { .. } => {
                ErrorCategory::Model
            }

            Error::StateCorrupted(_) | Error::StateStale { .. } => ErrorCategory::State,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the next burst may succeed without operator action.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Snapshot producer may publish a good one next cycle
            Error::Ingest(_) | Error::Io(_) | Error::Json(_) => true,
            // Hyperparameters are re-read every burst
            Error::InvalidHyperparams(_) => true,
            // Reset to empty state and continue
            Error::StateCorrupted(_) | Error::StateStale { .. } => true,
            // Only that dimension is skipped
            Error::MissingModel { .. } | Error::SingularCovariance { .. } => true,
            Error::Scoring(_) => true,

            Error::Config(_)
            | Error::InvalidTopology(_)
            | Error::InvalidTravelTimes(_)
            | Error::InvalidModels(_)
            | Error::InvalidCalendar(_)
            | Error::UnknownLine { .. } => false,
        }
    }

    /// Human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'bunchwatch check' to validate the configuration directory."
            }
            Error::InvalidTopology(_) => {
                "Fix topology.json: every line needs two destinations and at least two stops per direction."
            }
            Error::InvalidTravelTimes(_) => {
                "Fix travel_times.json: mean inter-stop times must be finite and non-negative."
            }
            Error::InvalidModels(_) => {
                "Re-export models.json from the trainer and run 'bunchwatch check'."
            }
            Error::InvalidHyperparams(_) => {
                "Use 'bunchwatch hyperparams set' to rewrite the line's values; previous values stay in effect."
            }
            Error::InvalidCalendar(_) => {
                "Fix calendar.json: hour ranges must satisfy 0 <= start < end <= 24 and holidays must be YYYY-MM-DD."
            }
            Error::Ingest(_) => {
                "Check that the poller is writing complete snapshots. The next burst will be retried."
            }
            Error::UnknownLine { .. } => {
                "Add the line to topology.json or stop polling it."
            }
            Error::Scoring(_) => "Inspect the model slice for the reported line and dimension.",
            Error::MissingModel { .. } => {
                "Retrain models for this time slot; the dimension is skipped until then."
            }
            Error::SingularCovariance { .. } => {
                "Training data for this slice is degenerate; retrain with more history."
            }
            Error::StateCorrupted(_) => {
                "Delete series_state.json in the data directory; tracking restarts empty."
            }
            Error::StateStale { .. } => "No action needed: tracking restarts from an empty state.",
            Error::Io(_) => "Check permissions and free space in the data directory.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>'.",
        }
    }

    /// Short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidTopology(_) => "Invalid Topology",
            Error::InvalidTravelTimes(_) => "Invalid Travel Times",
            Error::InvalidModels(_) => "Invalid Model Store",
            Error::InvalidHyperparams(_) => "Invalid Hyperparameters",
            Error::InvalidCalendar(_) => "Invalid Service Calendar",
            Error::Ingest(_) => "Snapshot Ingest Error",
            Error::UnknownLine { .. } => "Unknown Line",
            Error::Scoring(_) => "Scoring Error",
            Error::MissingModel { .. } => "Missing Model Slice",
            Error::SingularCovariance { .. } => "Singular Covariance",
            Error::StateCorrupted(_) => "Series State Corrupted",
            Error::StateStale { .. } => "Series State Stale",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Machine-readable error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
    pub remediation: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        let mut context = BTreeMap::new();
        match err {
            Error::UnknownLine { line } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            Error::MissingModel {
                line,
                day_type,
                hour_range,
                dimension,
            } => {
                context.insert("line".to_string(), serde_json::json!(line));
                context.insert("day_type".to_string(), serde_json::json!(day_type));
                context.insert("hour_range".to_string(), serde_json::json!(hour_range));
                context.insert("dimension".to_string(), serde_json::json!(dimension));
            }
            Error::SingularCovariance { line, dimension } => {
                context.insert("line".to_string(), serde_json::json!(line));
                context.insert("dimension".to_string(), serde_json::json!(dimension));
            }
            Error::StateStale { age_secs } => {
                context.insert("age_secs".to_string(), serde_json::json!(age_secs));
            }
            _ => {}
        }

        ErrorReport {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            remediation: err.remediation().to_string(),
            context,
        }
    }
}

impl ErrorReport {
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for stderr.
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };
    format!(
        "{red}✗{reset} {}\n  Reason: {}\n  {cyan}Fix:{reset} {}",
        err.headline(),
        err,
        err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(Error::InvalidModels("x".into()).code(), 13);
        assert_eq!(Error::UnknownLine { line: "1".into() }.code(), 21);
        assert_eq!(
            Error::SingularCovariance {
                line: "1".into(),
                dimension: 2
            }
            .code(),
            32
        );
        assert_eq!(Error::StateStale { age_secs: 900 }.code(), 51);

        let io = Error::Io(std::io::Error::other("disk"));
        assert_eq!(io.code(), 60);
        assert_eq!(io.category(), ErrorCategory::Io);
    }

    #[test]
    fn per_dimension_failures_are_recoverable() {
        assert!(Error::SingularCovariance {
            line: "1".into(),
            dimension: 3
        }
        .is_recoverable());
        assert!(Error::InvalidHyperparams("x".into()).is_recoverable());
        assert!(!Error::InvalidTopology("x".into()).is_recoverable());
    }

    #[test]
    fn report_carries_context() {
        let err = Error::MissingModel {
            line: "44".into(),
            day_type: "SA".into(),
            hour_range: "7-8".into(),
            dimension: 4,
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.code, 31);
        assert_eq!(report.category, ErrorCategory::Model);
        assert_eq!(report.context.get("dimension"), Some(&serde_json::json!(4)));
        let json = report.to_json();
        assert!(json.contains(r#""category":"model""#));
        assert!(json.contains(r#""recoverable":true"#));
    }

    #[test]
    fn human_format_has_headline_and_fix() {
        let out = format_error_human(&Error::StateCorrupted("bad envelope".into()), false);
        assert!(out.contains("Series State Corrupted"));
        assert!(out.contains("bad envelope"));
        assert!(out.contains("series_state.json"));
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Ingest.to_string(), "ingest");
        assert_eq!(ErrorCategory::State.to_string(), "state");
    }
}
