//! Sliding headway windows.

use crate::headway::{HeadwayRecord, LineHeadways};
use bw_common::{BusGroupKey, BusId, Direction, LineId};
use chrono::{DateTime, Utc};

/// `d` consecutive headways and the `d + 1` buses they separate.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub line: LineId,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub key: BusGroupKey,
    pub headways: Vec<f64>,
}

impl Window {
    pub fn dimension(&self) -> usize {
        self.headways.len()
    }
}

/// Windows of width `dimension` over one direction's rows.
///
/// The lead row is skipped; a chain of `n` buses gives `max(0, n - d)`
/// windows.
pub fn build_windows(records: &[HeadwayRecord], dimension: usize) -> Vec<Window> {
    let rows: Vec<&HeadwayRecord> = records.iter().filter(|r| !r.is_lead()).collect();
    if dimension == 0 || rows.len() < dimension {
        return Vec::new();
    }
    rows.windows(dimension)
        .filter_map(|span| {
            let first = span[0];
            let mut buses: Vec<BusId> = Vec::with_capacity(dimension + 1);
            buses.push(first.bus_a);
            buses.extend(span.iter().map(|r| r.bus_b));
            let key = BusGroupKey::from_buses(&buses).ok()?;
            Some(Window {
                line: first.line.clone(),
                direction: first.direction,
                timestamp: first.timestamp,
                key,
                headways: span.iter().map(|r| r.headway_secs).collect(),
            })
        })
        .collect()
}

/// Windows of width `dimension` over both directions of a line.
pub fn line_windows(headways: &LineHeadways, dimension: usize) -> Vec<Window> {
    Direction::BOTH
        .iter()
        .flat_map(|&d| build_windows(headways.direction(d), dimension))
        .collect()
}
