//! Bunchwatch common types, IDs, and errors.
//!
//! Foundational types shared across the workspace:
//! - Line, stop and bus identities, and the fixed-arity bus-group key
//! - The unified error type with stable codes
//! - Output format selection for CLI commands
//! - Atomic JSON file replacement

pub mod error;
pub mod fsutil;
pub mod id;
pub mod output;

pub use error::{Error, ErrorCategory, ErrorReport, Result};
pub use id::{BusGroupKey, BusId, Direction, KeyError, LineId, StopId, GROUP_SLOTS, MAX_DIM};
pub use output::OutputFormat;
