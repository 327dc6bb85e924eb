//! Per-bus-group anomaly series.
//!
//! Every bus group seen in a window gets one [`GroupSeriesEntry`]. The
//! entry is either [`SeriesState::Clean`] or accumulating an anomalous run
//! ([`SeriesState::Anomalous`]). Runs end in one of three ways, each
//! producing a [`ClosedEpisode`]:
//!
//! - a clean window for the group ([`ClosureReason::CleanBreak`])
//! - an anomalous window arriving more than 120 s after the group was last
//!   seen ([`ClosureReason::Timeout`]); the new window starts a fresh run
//! - the group not being seen for more than 300 s ([`ClosureReason::Expired`]);
//!   the entry is removed
//!
//! All mutation goes through [`SeriesTracker`].

pub mod tracker;

pub use tracker::{SeriesTracker, TrackerConfig};

use bw_common::{BusGroupKey, Direction, LineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a bus group stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SeriesState {
    Clean,
    Anomalous {
        /// Consecutive anomalous observations so far (at least 1).
        run: u32,
        started_at: DateTime<Utc>,
        last_anomalous_at: DateTime<Utc>,
        distance_sum: f64,
        distance_max: f64,
    },
}

impl SeriesState {
    pub(crate) fn start(at: DateTime<Utc>, distance: f64) -> Self {
        SeriesState::Anomalous {
            run: 1,
            started_at: at,
            last_anomalous_at: at,
            distance_sum: distance,
            distance_max: distance,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        matches!(self, SeriesState::Anomalous { .. })
    }

    pub fn run(&self) -> u32 {
        match self {
            SeriesState::Clean => 0,
            SeriesState::Anomalous { run, .. } => *run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSeriesEntry {
    pub key: BusGroupKey,
    pub line: LineId,
    pub direction: Direction,
    pub dimension: usize,
    pub last_timestamp: DateTime<Utc>,
    pub last_distance: f64,
    #[serde(flatten)]
    pub state: SeriesState,
}

impl GroupSeriesEntry {
    pub fn consecutive_anomaly_count(&self) -> u32 {
        self.state.run()
    }

    pub fn last_is_anomalous(&self) -> bool {
        self.state.is_anomalous()
    }

    /// Sanity check for entries read back from disk.
    pub fn is_consistent(&self) -> bool {
        let run_ok = match &self.state {
            SeriesState::Clean => true,
            SeriesState::Anomalous {
                run,
                started_at,
                last_anomalous_at,
                ..
            } => *run >= 1 && started_at <= last_anomalous_at,
        };
        run_ok && self.key.dimension() == self.dimension
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureReason {
    CleanBreak,
    Timeout,
    Expired,
}

impl fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClosureReason::CleanBreak => "clean_break",
            ClosureReason::Timeout => "timeout",
            ClosureReason::Expired => "expired",
        })
    }
}

/// A finished anomalous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedEpisode {
    pub key: BusGroupKey,
    pub line: LineId,
    pub direction: Direction,
    pub dimension: usize,
    pub length: u32,
    pub mean_distance: f64,
    pub max_distance: f64,
    pub started_at: DateTime<Utc>,
    /// Last anomalous observation of the run.
    pub ended_at: DateTime<Utc>,
    /// Burst that closed it.
    pub closed_at: DateTime<Utc>,
    pub reason: ClosureReason,
}
