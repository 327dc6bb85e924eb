//! Historical mean inter-stop travel times (`travel_times.json`).
//!
//! Produced offline from past trips; one record per segment and time slot:
//!
//! ```json
//! {"segments": [
//!   {"line": "44", "direction": 1, "day_type": "LA", "hour_range": "7-8",
//!    "from": 1101, "to": 1102, "mean_secs": 74.5}
//! ]}
//! ```

use crate::calendar::{DayType, HourRange, TimeSlot};
use bw_common::{Direction, LineId, StopId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTime {
    pub line: LineId,
    pub direction: Direction,
    pub day_type: DayType,
    pub hour_range: HourRange,
    pub from: StopId,
    pub to: StopId,
    pub mean_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TravelTimesFile {
    #[serde(default)]
    segments: Vec<SegmentTime>,
}

type SegmentKey = (LineId, Direction, DayType, HourRange, StopId);

/// Segment records indexed by their upstream stop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TravelTimesFile", into = "TravelTimesFile")]
pub struct TravelTimes {
    segments: Vec<SegmentTime>,
    index: HashMap<SegmentKey, usize>,
}

impl From<TravelTimesFile> for TravelTimes {
    fn from(file: TravelTimesFile) -> Self {
        TravelTimes::from_segments(file.segments)
    }
}

impl From<TravelTimes> for TravelTimesFile {
    fn from(t: TravelTimes) -> Self {
        TravelTimesFile {
            segments: t.segments,
        }
    }
}

impl TravelTimes {
    /// Build the index; the first record for a key wins.
    pub fn from_segments(segments: Vec<SegmentTime>) -> Self {
        let mut index = HashMap::with_capacity(segments.len());
        for (i, s) in segments.iter().enumerate() {
            index
                .entry((s.line.clone(), s.direction, s.day_type, s.hour_range, s.from))
                .or_insert(i);
        }
        TravelTimes { segments, index }
    }

    pub fn segments(&self) -> &[SegmentTime] {
        &self.segments
    }

    /// Mean seconds from `from` to the next stop downstream, for this slot.
    pub fn mean_from(
        &self,
        line: &LineId,
        direction: Direction,
        slot: TimeSlot,
        from: StopId,
    ) -> Option<f64> {
        let key = (line.clone(), direction, slot.day_type, slot.hour_range, from);
        self.index.get(&key).map(|&i| self.segments[i].mean_secs)
    }
}
