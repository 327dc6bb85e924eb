//! Headway extraction: one ordered bus chain per direction.
//!
//! Each direction's stops are walked from the one before the terminal back
//! to the origin. Walking upstream, the mean travel time of each segment is
//! added to a running offset, so `offset + eta` at any stop estimates the
//! time the bus still needs to reach the end of the line. A bus reported at
//! several stops is placed by its nearest one (smallest raw ETA).
//!
//! Three heuristics drop buses that are between trips rather than on one:
//! any bus reported at the origin, a bus at the second stop that is still
//! more than halfway back to the origin, and a bus under 20 s from the
//! penultimate stop (it is about to finish and will reappear on the other
//! direction).

use crate::ingest::CleanSample;
use bw_common::{BusId, Direction, LineId, StopId};
use bw_config::{LineTopology, TimeSlot, TravelTimes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Raw ETA below which a bus at the penultimate stop is treated as finishing.
pub const FINISHING_ETA_SECS: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadwayRecord {
    pub line: LineId,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    /// 0 for the lead bus of the direction.
    pub position: usize,
    /// [`BusId::NONE`] on the lead row.
    pub bus_a: BusId,
    pub bus_b: BusId,
    pub headway_secs: f64,
    pub bus_b_time_to_terminal: f64,
}

impl HeadwayRecord {
    pub fn is_lead(&self) -> bool {
        self.position == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainedBus {
    pub bus: BusId,
    pub time_to_terminal: f64,
}

/// Things worth logging that did not stop extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractNote {
    /// No travel time for the segment starting at `from`; stops upstream
    /// of it were ignored.
    SegmentMissing { direction: Direction, from: StopId },
    /// Fewer than two buses left.
    DirectionEmpty { direction: Direction, buses: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineHeadways {
    pub outbound: Vec<HeadwayRecord>,
    pub inbound: Vec<HeadwayRecord>,
}

impl LineHeadways {
    pub fn direction(&self, direction: Direction) -> &[HeadwayRecord] {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    fn direction_mut(&mut self, direction: Direction) -> &mut Vec<HeadwayRecord> {
        match direction {
            Direction::Outbound => &mut self.outbound,
            Direction::Inbound => &mut self.inbound,
        }
    }

    /// Rows of both directions, lead rows included.
    pub fn records(&self) -> impl Iterator<Item = &HeadwayRecord> {
        self.outbound.iter().chain(self.inbound.iter())
    }

    /// Headways proper, lead rows excluded.
    pub fn headway_count(&self) -> usize {
        self.records().filter(|r| !r.is_lead()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.headway_count() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub headways: LineHeadways,
    pub notes: Vec<ExtractNote>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    time_to_terminal: f64,
    raw_eta: f64,
}

#[derive(Debug, Default)]
struct DirectionScan {
    candidates: BTreeMap<BusId, Candidate>,
    excluded: HashSet<BusId>,
}

/// Everything one direction's samples say about bus positions.
fn scan_direction(
    line: &LineId,
    direction: Direction,
    samples: &[CleanSample],
    topology: &LineTopology,
    travel: &TravelTimes,
    slot: TimeSlot,
    notes: &mut Vec<ExtractNote>,
) -> DirectionScan {
    let route = topology.direction(direction);
    let mut scan = DirectionScan::default();
    let n = route.stops.len();
    if n < 2 {
        return scan;
    }
    let penultimate = n - 2;

    let mut offset = 0.0;
    for idx in (0..=penultimate).rev() {
        let stop = &route.stops[idx];
        if idx < penultimate {
            match travel.mean_from(line, direction, slot, stop.stop) {
                Some(mean) => offset += mean,
                None => {
                    notes.push(ExtractNote::SegmentMissing {
                        direction,
                        from: stop.stop,
                    });
                    break;
                }
            }
        }

        let mut seen = BTreeSet::new();
        let at_stop = samples
            .iter()
            .filter(|s| s.direction == direction && s.sample.stop == stop.stop)
            .map(|s| &s.sample)
            // First report per bus wins
            .filter(|s| seen.insert(s.bus));

        for sample in at_stop {
            let excluded = if idx == 0 {
                true
            } else if idx == 1 {
                sample.distance_m > stop.distance_m / 2.0
            } else {
                idx == penultimate && sample.eta_secs < FINISHING_ETA_SECS
            };
            if excluded {
                scan.excluded.insert(sample.bus);
            }

            let candidate = Candidate {
                time_to_terminal: offset + sample.eta_secs,
                raw_eta: sample.eta_secs,
            };
            scan.candidates
                .entry(sample.bus)
                .and_modify(|c| {
                    if candidate.raw_eta < c.raw_eta {
                        *c = candidate;
                    }
                })
                .or_insert(candidate);
        }
    }
    scan
}

/// Order a direction's buses by time to terminal, lead first.
pub fn sort_chain(chain: &mut [ChainedBus]) {
    chain.sort_by(|a, b| {
        a.time_to_terminal
            .total_cmp(&b.time_to_terminal)
            .then(a.bus.cmp(&b.bus))
    });
}

/// Headway rows for a sorted chain; empty when fewer than two buses.
pub fn chain_records(
    line: &LineId,
    direction: Direction,
    timestamp: DateTime<Utc>,
    chain: &[ChainedBus],
) -> Vec<HeadwayRecord> {
    if chain.len() < 2 {
        return Vec::new();
    }
    let mut prev: Option<&ChainedBus> = None;
    chain
        .iter()
        .enumerate()
        .map(|(position, bus)| {
            let (bus_a, headway_secs) = match prev {
                Some(p) => (p.bus, bus.time_to_terminal - p.time_to_terminal),
                None => (BusId::NONE, 0.0),
            };
            prev = Some(bus);
            HeadwayRecord {
                line: line.clone(),
                direction,
                timestamp,
                position,
                bus_a,
                bus_b: bus.bus,
                headway_secs,
                bus_b_time_to_terminal: bus.time_to_terminal,
            }
        })
        .collect()
}

/// Extract both directions' headways for one line.
pub fn extract_line(
    line: &LineId,
    samples: &[CleanSample],
    topology: &LineTopology,
    travel: &TravelTimes,
    slot: TimeSlot,
    timestamp: DateTime<Utc>,
) -> Extraction {
    let mut notes = Vec::new();
    let mut out = scan_direction(
        line,
        Direction::Outbound,
        samples,
        topology,
        travel,
        slot,
        &mut notes,
    );
    let mut inb = scan_direction(
        line,
        Direction::Inbound,
        samples,
        topology,
        travel,
        slot,
        &mut notes,
    );

    // A bus seen on both sides belongs to the one it is closer to finishing
    let shared: Vec<BusId> = out
        .candidates
        .keys()
        .filter(|b| inb.candidates.contains_key(b))
        .copied()
        .collect();
    for bus in shared {
        let o = out.candidates[&bus].time_to_terminal;
        let i = inb.candidates[&bus].time_to_terminal;
        if i < o {
            out.candidates.remove(&bus);
        } else {
            inb.candidates.remove(&bus);
        }
    }

    let mut headways = LineHeadways::default();
    for (direction, scan) in [(Direction::Outbound, out), (Direction::Inbound, inb)] {
        let mut chain: Vec<ChainedBus> = scan
            .candidates
            .iter()
            .filter(|(bus, _)| !scan.excluded.contains(bus))
            .map(|(&bus, c)| ChainedBus {
                bus,
                time_to_terminal: c.time_to_terminal,
            })
            .collect();
        sort_chain(&mut chain);
        if chain.len() < 2 {
            notes.push(ExtractNote::DirectionEmpty {
                direction,
                buses: chain.len(),
            });
        }
        *headways.direction_mut(direction) = chain_records(line, direction, timestamp, &chain);
    }

    Extraction { headways, notes }
}
