//! Configuration validation errors and semantic validation.
//!
//! Serde enforces shape; these checks enforce meaning. Per-dimension model
//! problems (bad covariance shape, singular matrix) are deliberately not
//! fatal here: they surface through [`CompiledModels::issues`] and only
//! disable the affected dimension.
//!
//! [`CompiledModels::issues`]: crate::models::CompiledModels::issues

use crate::calendar::ServiceCalendar;
use crate::hyperparams::{Hyperparams, LineHyperparams};
use crate::models::ModelStore;
use crate::topology::{DirectionTopology, Topology};
use crate::travel_times::TravelTimes;
use bw_common::{Direction, LineId};
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("semantic validation failed: {0}")]
    SemanticError(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("reference to unknown {kind} '{name}'")]
    UnknownReference { kind: &'static str, name: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SemanticError(_) => 16,
            ValidationError::InvalidValue { .. } => 17,
            ValidationError::UnknownReference { .. } => 18,
        }
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

pub fn validate_topology(topology: &Topology) -> ValidationResult<()> {
    if topology.lines.is_empty() {
        return Err(ValidationError::SemanticError(
            "topology defines no lines".to_string(),
        ));
    }
    for (line, lt) in &topology.lines {
        if lt.outbound.destination == lt.inbound.destination {
            return Err(invalid(
                format!("lines.{line}"),
                format!(
                    "both directions share destination '{}'",
                    lt.outbound.destination
                ),
            ));
        }
        for d in Direction::BOTH {
            validate_direction(line, d, lt.direction(d))?;
        }
    }
    Ok(())
}

fn validate_direction(line: &LineId, d: Direction, dt: &DirectionTopology) -> ValidationResult<()> {
    let field = format!("lines.{line}.{}", direction_name(d));
    if dt.destination.trim().is_empty() {
        return Err(invalid(format!("{field}.destination"), "must not be empty"));
    }
    if !(dt.length_m.is_finite() && dt.length_m > 0.0) {
        return Err(invalid(
            format!("{field}.length_m"),
            format!("must be positive, got {}", dt.length_m),
        ));
    }
    if dt.stops.len() < 2 {
        return Err(invalid(
            format!("{field}.stops"),
            format!("needs at least 2 stops, got {}", dt.stops.len()),
        ));
    }
    let mut prev = f64::NEG_INFINITY;
    for (i, s) in dt.stops.iter().enumerate() {
        if dt.stops[..i].iter().any(|o| o.stop == s.stop) {
            return Err(invalid(
                format!("{field}.stops[{i}]"),
                format!("stop {} listed twice", s.stop),
            ));
        }
        if !(s.distance_m.is_finite() && s.distance_m >= 0.0) || s.distance_m < prev {
            return Err(invalid(
                format!("{field}.stops[{i}].distance_m"),
                format!("must be non-negative and non-decreasing, got {}", s.distance_m),
            ));
        }
        prev = s.distance_m;
    }
    Ok(())
}

fn direction_name(d: Direction) -> &'static str {
    match d {
        Direction::Outbound => "outbound",
        Direction::Inbound => "inbound",
    }
}

pub fn validate_travel_times(times: &TravelTimes, topology: &Topology) -> ValidationResult<()> {
    for (i, seg) in times.segments().iter().enumerate() {
        if !(seg.mean_secs.is_finite() && seg.mean_secs >= 0.0) {
            return Err(invalid(
                format!("segments[{i}].mean_secs"),
                format!("must be finite and non-negative, got {}", seg.mean_secs),
            ));
        }
        let line = topology
            .line(&seg.line)
            .ok_or_else(|| ValidationError::UnknownReference {
                kind: "line",
                name: seg.line.to_string(),
            })?;
        let dir = line.direction(seg.direction);
        if !dir.contains(seg.from) || !dir.contains(seg.to) {
            return Err(invalid(
                format!("segments[{i}]"),
                format!(
                    "segment {}->{} is not on line {} direction {}",
                    seg.from, seg.to, seg.line, seg.direction
                ),
            ));
        }
    }
    Ok(())
}

pub fn validate_models(store: &ModelStore) -> ValidationResult<()> {
    for (line, slot, slice) in store.slices() {
        if slice.max_dim == 0 {
            return Err(invalid(
                format!("{line}.{}.{}.max_dim", slot.day_type, slot.hour_range),
                "must be at least 1",
            ));
        }
    }
    Ok(())
}

pub fn validate_line_hyperparams(line: &LineId, hp: &LineHyperparams) -> ValidationResult<()> {
    if !(hp.confidence > 0.0 && hp.confidence < 1.0) {
        return Err(invalid(
            format!("{line}.conf"),
            format!("must be in (0, 1), got {}", hp.confidence),
        ));
    }
    if hp.size_threshold == 0 {
        return Err(invalid(format!("{line}.size_th"), "must be at least 1"));
    }
    Ok(())
}

pub fn validate_hyperparams(hp: &Hyperparams) -> ValidationResult<()> {
    hp.0
        .iter()
        .try_for_each(|(line, values)| validate_line_hyperparams(line, values))
}

pub fn validate_calendar(cal: &ServiceCalendar) -> ValidationResult<()> {
    if cal.hour_ranges.is_empty() {
        return Err(invalid("hour_ranges", "must not be empty"));
    }
    let mut sorted = cal.hour_ranges.clone();
    sorted.sort();
    for pair in sorted.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(invalid(
                "hour_ranges",
                format!("{} overlaps {}", pair[0], pair[1]),
            ));
        }
    }
    Ok(())
}
