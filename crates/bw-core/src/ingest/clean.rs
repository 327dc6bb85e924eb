//! Sample sanitation against the static topology.

use super::{ArrivalSample, Snapshot};
use bw_common::{Direction, LineId};
use bw_config::Topology;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest plausible time to a stop.
pub const MAX_ETA_SECS: f64 = 7200.0;
/// Faster than this (km/h) is a bad position fix.
pub const MAX_SPEED_KMH: f64 = 120.0;
/// A bus slower than this (m/s) over a whole direction is not moving.
pub const MIN_SPEED_MPS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Malformed,
    UnknownLine,
    UnknownDestination,
    StopNotOnRoute,
    SentinelBus,
    DistanceOutOfRange,
    EtaOutOfRange,
    ImplausibleSpeed,
}

/// A sample that passed every check, with its direction resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSample {
    pub direction: Direction,
    pub sample: ArrivalSample,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub kept: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl CleanReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    fn record_drop(&mut self, reason: DropReason, n: usize) {
        if n > 0 {
            *self.dropped.entry(reason).or_insert(0) += n;
        }
    }
}

/// Direction of a usable sample, or the first rule it breaks.
pub fn check_sample(sample: &ArrivalSample, topology: &Topology) -> Result<Direction, DropReason> {
    let line = topology.line(&sample.line).ok_or(DropReason::UnknownLine)?;
    let direction = line
        .direction_for_destination(&sample.destination)
        .ok_or(DropReason::UnknownDestination)?;
    let route = line.direction(direction);

    if !route.contains(sample.stop) {
        return Err(DropReason::StopNotOnRoute);
    }
    if sample.bus.is_none() {
        return Err(DropReason::SentinelBus);
    }

    let (distance, eta) = (sample.distance_m, sample.eta_secs);
    if !(distance >= 0.0 && distance < route.length_m) {
        return Err(DropReason::DistanceOutOfRange);
    }
    if !(eta > 0.0 && eta < route.length_m / MIN_SPEED_MPS && eta < MAX_ETA_SECS) {
        return Err(DropReason::EtaOutOfRange);
    }
    if 3.6 * distance / eta >= MAX_SPEED_KMH {
        return Err(DropReason::ImplausibleSpeed);
    }
    Ok(direction)
}

/// Split a snapshot into per-line clean samples, preserving input order.
pub fn clean_samples(
    snapshot: &Snapshot,
    topology: &Topology,
) -> (BTreeMap<LineId, Vec<CleanSample>>, CleanReport) {
    let mut report = CleanReport::default();
    report.record_drop(DropReason::Malformed, snapshot.malformed);

    let mut by_line: BTreeMap<LineId, Vec<CleanSample>> = BTreeMap::new();
    for sample in &snapshot.samples {
        match check_sample(sample, topology) {
            Ok(direction) => {
                report.kept += 1;
                by_line.entry(sample.line.clone()).or_default().push(CleanSample {
                    direction,
                    sample: sample.clone(),
                });
            }
            Err(reason) => report.record_drop(reason, 1),
        }
    }
    (by_line, report)
}
