//! Bunchwatch core library.
//!
//! The headway anomaly pipeline, run once per burst:
//! - sample cleaning against the line topology (`ingest`)
//! - headway chains per direction (`headway`)
//! - sliding windows and distance scoring (`window`, `scoring`)
//! - the per-bus-group series state machine (`series`)
//! - anomaly events and the reportable view (`emitter`)
//!
//! plus the burst runner, output files, the `watch` loop, logging and exit
//! codes. The binary entry point is in `main.rs`.

pub mod burst;
pub mod daemon;
pub mod emitter;
pub mod exit_codes;
pub mod headway;
pub mod ingest;
pub mod logging;
pub mod persist;
pub mod scoring;
pub mod series;
pub mod window;

#[doc(hidden)]
pub mod test_log;

pub use burst::{BurstOutcome, BurstOutput, BurstReport, Detector};
pub use exit_codes::ExitCode;
