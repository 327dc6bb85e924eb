//! Exit codes for the bunchwatch CLI.
//!
//! Ranges:
//! - 0-9: operational outcomes (read the outcome from the code, not the output)
//! - 10-19: user or environment errors
//! - 20-29: internal errors

use bw_common::{Error, ErrorCategory};

/// Stable exit codes. Changing a value is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Burst processed, nothing reportable.
    Clean = 0,
    /// At least one reportable anomaly was emitted.
    AnomaliesReported = 1,
    /// Snapshot identical to the previous burst; no work done.
    Unchanged = 2,
    /// Outside every configured hour range; burst deferred.
    OutsideServiceHours = 3,

    ArgsError = 10,
    ConfigError = 11,
    /// Persisted series state unusable.
    StateError = 15,

    InternalError = 20,
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Operational outcomes (below 10) are not errors.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn code_name(self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::AnomaliesReported => "OK_ANOMALIES",
            ExitCode::Unchanged => "OK_UNCHANGED",
            ExitCode::OutsideServiceHours => "OK_DEFERRED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::StateError => "ERR_STATE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a failed command.
    pub fn for_error(err: &Error) -> ExitCode {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::State => ExitCode::StateError,
            ErrorCategory::Io => ExitCode::IoError,
            ErrorCategory::Ingest => ExitCode::ArgsError,
            ErrorCategory::Model => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::AnomaliesReported.as_i32(), 1);
        assert_eq!(ExitCode::Unchanged.as_i32(), 2);
        assert_eq!(ExitCode::OutsideServiceHours.as_i32(), 3);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::StateError.as_i32(), 15);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }

    #[test]
    fn ranges() {
        assert!(ExitCode::Unchanged.is_operational());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(!ExitCode::IoError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
    }

    #[test]
    fn error_mapping() {
        assert_eq!(
            ExitCode::for_error(&Error::InvalidModels("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::for_error(&Error::StateCorrupted("x".into())),
            ExitCode::StateError
        );
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(ExitCode::for_error(&io), ExitCode::IoError);
        assert_eq!(ExitCode::for_error(&Error::Ingest("x".into())), ExitCode::ArgsError);
    }

    #[test]
    fn display() {
        assert_eq!(ExitCode::Unchanged.to_string(), "OK_UNCHANGED (2)");
    }
}
