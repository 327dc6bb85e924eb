//! Bunchwatch configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the static topology, the inter-stop travel-time
//!   reference, the statistical model store, per-line hyperparameters and
//!   the service calendar
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation
//! - Config snapshots for provenance of persisted state

pub mod calendar;
pub mod hyperparams;
pub mod load;
pub mod models;
pub mod resolve;
pub mod snapshot;
pub mod topology;
pub mod travel_times;
pub mod validate;

pub use calendar::{DayType, HourRange, ServiceCalendar, TimeSlot};
pub use hyperparams::{
    HyperparamOrigin, HyperparamRead, HyperparamSource, Hyperparams, LineHyperparams,
};
pub use load::{load_config, ConfigError, ConfigFile, LoadedConfig};
pub use models::{CompiledModels, CompiledSlice, DimModel, ModelError, ModelStore};
pub use resolve::{resolve_paths, ConfigPaths, ConfigSource};
pub use snapshot::{hash_bytes, hash_content, ConfigSnapshot, FileDigest};
pub use topology::{DirectionTopology, LineTopology, StopPosition, Topology};
pub use travel_times::{SegmentTime, TravelTimes};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files and persisted envelopes.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
