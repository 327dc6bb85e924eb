//! Static line topology (`topology.json`).
//!
//! ```json
//! {
//!   "lines": {
//!     "44": {
//!       "outbound": {
//!         "destination": "CAMPUS",
//!         "length_m": 9800,
//!         "stops": [{"stop": 1101, "distance_m": 0}, {"stop": 1102, "distance_m": 420}]
//!       },
//!       "inbound": { "destination": "PLAZA", "length_m": 9650, "stops": [] }
//!     }
//!   }
//! }
//! ```
//!
//! Stops are listed origin first, terminal last; `distance_m` is measured
//! from the origin along the route.

use bw_common::{Direction, LineId, StopId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPosition {
    pub stop: StopId,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionTopology {
    /// Headsign shown on buses travelling this way.
    pub destination: String,
    pub length_m: f64,
    pub stops: Vec<StopPosition>,
}

impl DirectionTopology {
    pub fn origin(&self) -> Option<StopId> {
        self.stops.first().map(|s| s.stop)
    }

    pub fn terminal(&self) -> Option<StopId> {
        self.stops.last().map(|s| s.stop)
    }

    pub fn index_of(&self, stop: StopId) -> Option<usize> {
        self.stops.iter().position(|s| s.stop == stop)
    }

    pub fn contains(&self, stop: StopId) -> bool {
        self.index_of(stop).is_some()
    }

    pub fn distance_of(&self, stop: StopId) -> Option<f64> {
        self.stops.iter().find(|s| s.stop == stop).map(|s| s.distance_m)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTopology {
    pub outbound: DirectionTopology,
    pub inbound: DirectionTopology,
}

impl LineTopology {
    pub fn direction(&self, direction: Direction) -> &DirectionTopology {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    /// Direction whose headsign matches `destination`.
    pub fn direction_for_destination(&self, destination: &str) -> Option<Direction> {
        Direction::BOTH
            .into_iter()
            .find(|&d| self.direction(d).destination == destination)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub lines: BTreeMap<LineId, LineTopology>,
}

impl Topology {
    pub fn line(&self, line: &LineId) -> Option<&LineTopology> {
        self.lines.get(line)
    }

    pub fn line_ids(&self) -> impl Iterator<Item = &LineId> {
        self.lines.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "lines": {
            "44": {
                "outbound": {
                    "destination": "CAMPUS",
                    "length_m": 3000,
                    "stops": [
                        {"stop": 1, "distance_m": 0},
                        {"stop": 2, "distance_m": 800},
                        {"stop": 3, "distance_m": 3000}
                    ]
                },
                "inbound": {
                    "destination": "PLAZA",
                    "length_m": 3100,
                    "stops": [
                        {"stop": 4, "distance_m": 0},
                        {"stop": 5, "distance_m": 1500},
                        {"stop": 6, "distance_m": 3100}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn parses_and_answers_lookups() {
        let topo: Topology = serde_json::from_str(SAMPLE).unwrap();
        let line = topo.line(&LineId::from("44")).unwrap();
        assert_eq!(line.direction_for_destination("PLAZA"), Some(Direction::Inbound));
        assert_eq!(line.direction_for_destination("NOWHERE"), None);

        let out = line.direction(Direction::Outbound);
        assert_eq!(out.origin(), Some(StopId(1)));
        assert_eq!(out.terminal(), Some(StopId(3)));
        assert_eq!(out.index_of(StopId(2)), Some(1));
        assert_eq!(out.distance_of(StopId(2)), Some(800.0));
        assert!(!out.contains(StopId(5)));
    }
}
