//! The series state machine.

use super::{ClosedEpisode, ClosureReason, GroupSeriesEntry, SeriesState};
use crate::scoring::WindowSample;
use bw_common::BusGroupKey;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Closure timings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// An anomalous window after a longer silence starts a new run.
    pub run_timeout: Duration,
    /// Entries not seen for longer than this are removed.
    pub expiry: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            run_timeout: Duration::seconds(120),
            expiry: Duration::seconds(300),
        }
    }
}

/// Owner of every [`GroupSeriesEntry`], keyed by bus group.
#[derive(Debug, Clone, Default)]
pub struct SeriesTracker {
    entries: BTreeMap<BusGroupKey, GroupSeriesEntry>,
    config: TrackerConfig,
}

fn close(entry: &GroupSeriesEntry, now: DateTime<Utc>, reason: ClosureReason) -> Option<ClosedEpisode> {
    match entry.state {
        SeriesState::Clean => None,
        SeriesState::Anomalous {
            run,
            started_at,
            last_anomalous_at,
            distance_sum,
            distance_max,
        } => Some(ClosedEpisode {
            key: entry.key,
            line: entry.line.clone(),
            direction: entry.direction,
            dimension: entry.dimension,
            length: run,
            mean_distance: distance_sum / f64::from(run.max(1)),
            max_distance: distance_max,
            started_at,
            ended_at: last_anomalous_at,
            closed_at: now,
            reason,
        }),
    }
}

impl SeriesTracker {
    pub fn new(config: TrackerConfig) -> Self {
        SeriesTracker {
            entries: BTreeMap::new(),
            config,
        }
    }

    /// Rebuild from persisted entries. Later duplicates of a key replace
    /// earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = GroupSeriesEntry>, config: TrackerConfig) -> Self {
        SeriesTracker {
            entries: entries.into_iter().map(|e| (e.key, e)).collect(),
            config,
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &BusGroupKey) -> Option<&GroupSeriesEntry> {
        self.entries.get(key)
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &GroupSeriesEntry> {
        self.entries.values()
    }

    pub fn anomalous_count(&self) -> usize {
        self.entries.values().filter(|e| e.last_is_anomalous()).count()
    }

    /// Apply one scored window observed at `now`.
    pub fn observe(&mut self, sample: &WindowSample, now: DateTime<Utc>) -> Option<ClosedEpisode> {
        let distance = sample.distance;
        let timeout = self.config.run_timeout;
        if !self.entries.contains_key(&sample.key) {
            let state = if sample.is_anomalous {
                SeriesState::start(now, distance)
            } else {
                SeriesState::Clean
            };
            self.entries.insert(
                sample.key,
                GroupSeriesEntry {
                    key: sample.key,
                    line: sample.line.clone(),
                    direction: sample.direction,
                    dimension: sample.dimension,
                    last_timestamp: now,
                    last_distance: distance,
                    state,
                },
            );
            return None;
        }

        let entry = self.entries.get_mut(&sample.key)?;
        let elapsed = now - entry.last_timestamp;
        let closed = match (entry.state.is_anomalous(), sample.is_anomalous) {
            (false, false) => None,
            (false, true) => {
                entry.state = SeriesState::start(now, distance);
                None
            }
            (true, false) => {
                let closed = close(entry, now, ClosureReason::CleanBreak);
                entry.state = SeriesState::Clean;
                closed
            }
            (true, true) if elapsed > timeout => {
                let closed = close(entry, now, ClosureReason::Timeout);
                entry.state = SeriesState::start(now, distance);
                closed
            }
            (true, true) => {
                if let SeriesState::Anomalous {
                    run,
                    last_anomalous_at,
                    distance_sum,
                    distance_max,
                    ..
                } = &mut entry.state
                {
                    *run += 1;
                    *last_anomalous_at = now;
                    *distance_sum += distance;
                    *distance_max = distance_max.max(distance);
                }
                None
            }
        };
        entry.last_timestamp = now;
        entry.last_distance = distance;
        closed
    }

    /// Remove entries not seen within the expiry window, closing open runs.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepResult {
        let expiry = self.config.expiry;
        let stale: Vec<BusGroupKey> = self
            .entries
            .values()
            .filter(|e| now - e.last_timestamp > expiry)
            .map(|e| e.key)
            .collect();

        let mut result = SweepResult::default();
        for key in stale {
            if let Some(entry) = self.entries.remove(&key) {
                result.removed += 1;
                result
                    .closed
                    .extend(close(&entry, now, ClosureReason::Expired));
            }
        }
        result
    }

    /// One burst: observe every sample, then sweep.
    pub fn update_burst(&mut self, samples: &[WindowSample], now: DateTime<Utc>) -> BurstUpdate {
        let mut closed: Vec<ClosedEpisode> = samples
            .iter()
            .filter_map(|s| self.observe(s, now))
            .collect();
        let sweep = self.sweep(now);
        closed.extend(sweep.closed);
        BurstUpdate {
            closed,
            removed: sweep.removed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepResult {
    pub removed: usize,
    pub closed: Vec<ClosedEpisode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BurstUpdate {
    pub closed: Vec<ClosedEpisode>,
    /// Entries dropped by the sweep.
    pub removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_common::{BusId, Direction, LineId};
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn sample(buses: &[u32], distance: f64) -> WindowSample {
        let ids: Vec<BusId> = buses.iter().map(|&b| BusId(b)).collect();
        WindowSample {
            line: LineId::from("44"),
            direction: Direction::Outbound,
            timestamp: t(0),
            dimension: ids.len() - 1,
            key: BusGroupKey::from_buses(&ids).unwrap(),
            headways: vec![30.0; ids.len() - 1],
            distance,
            threshold: 2.0,
            is_anomalous: distance > 2.0,
        }
    }

    #[test]
    fn first_sighting() {
        let mut tr = SeriesTracker::default();
        assert!(tr.observe(&sample(&[1, 2], 3.0), t(0)).is_none());
        assert!(tr.observe(&sample(&[2, 3], 1.0), t(0)).is_none());
        assert_eq!(tr.get(&sample(&[1, 2], 0.0).key).unwrap().consecutive_anomaly_count(), 1);
        assert_eq!(tr.get(&sample(&[2, 3], 0.0).key).unwrap().consecutive_anomaly_count(), 0);
        assert_eq!(tr.anomalous_count(), 1);
    }

    #[test]
    fn clean_break_closes_run() {
        let mut tr = SeriesTracker::default();
        tr.observe(&sample(&[1, 2], 3.0), t(0));
        tr.observe(&sample(&[1, 2], 5.0), t(30));
        let ep = tr.observe(&sample(&[1, 2], 1.0), t(60)).unwrap();
        assert_eq!(ep.length, 2);
        assert_eq!(ep.reason, ClosureReason::CleanBreak);
        assert_eq!(ep.mean_distance, 4.0);
        assert_eq!(ep.max_distance, 5.0);
        assert_eq!(ep.started_at, t(0));
        assert_eq!(ep.ended_at, t(30));
        assert_eq!(ep.closed_at, t(60));
        let entry = tr.get(&ep.key).unwrap();
        assert!(!entry.last_is_anomalous());
        assert_eq!(entry.last_timestamp, t(60));
    }

    #[test]
    fn clean_windows_keep_clean_entries() {
        let mut tr = SeriesTracker::default();
        tr.observe(&sample(&[1, 2], 1.0), t(0));
        assert!(tr.observe(&sample(&[1, 2], 1.5), t(30)).is_none());
        assert!(tr.observe(&sample(&[1, 2], 3.0), t(60)).is_none());
        assert_eq!(tr.get(&sample(&[1, 2], 0.0).key).unwrap().consecutive_anomaly_count(), 1);
    }

    #[test]
    fn timeout_restarts_run() {
        let mut tr = SeriesTracker::default();
        tr.observe(&sample(&[1, 2], 3.0), t(0));
        // Exactly 120 s is still a continuation
        assert!(tr.observe(&sample(&[1, 2], 3.0), t(120)).is_none());
        let ep = tr.observe(&sample(&[1, 2], 3.0), t(241)).unwrap();
        assert_eq!(ep.reason, ClosureReason::Timeout);
        assert_eq!(ep.length, 2);
        let entry = tr.get(&ep.key).unwrap();
        assert_eq!(entry.consecutive_anomaly_count(), 1);
        match entry.state {
            SeriesState::Anomalous { started_at, .. } => assert_eq!(started_at, t(241)),
            SeriesState::Clean => panic!("expected a fresh run"),
        }
    }

    #[test]
    fn sweep_expires_quiet_groups() {
        let mut tr = SeriesTracker::default();
        tr.observe(&sample(&[1, 2], 3.0), t(0));
        tr.observe(&sample(&[3, 4], 1.0), t(0));
        tr.observe(&sample(&[5, 6], 3.0), t(200));

        assert_eq!(tr.sweep(t(300)).removed, 0);

        let swept = tr.sweep(t(301));
        assert_eq!(swept.removed, 2);
        assert_eq!(swept.closed.len(), 1);
        assert_eq!(swept.closed[0].reason, ClosureReason::Expired);
        assert_eq!(swept.closed[0].closed_at, t(301));
        assert_eq!(tr.len(), 1);
    }

    #[test]
    fn burst_update_observes_then_sweeps() {
        let mut tr = SeriesTracker::default();
        tr.update_burst(&[sample(&[1, 2], 3.0), sample(&[7, 8], 3.0)], t(0));
        let update = tr.update_burst(&[sample(&[1, 2], 1.0)], t(400));
        // [1,2] had been quiet for 400 s but is seen again, so it closes
        // on the clean window and survives the sweep.
        assert_eq!(update.closed.len(), 2);
        assert_eq!(update.closed[0].reason, ClosureReason::CleanBreak);
        assert_eq!(update.closed[1].reason, ClosureReason::Expired);
        assert_eq!(update.removed, 1);
        assert_eq!(tr.len(), 1);
    }

    #[test]
    fn restores_from_entries() {
        let mut tr = SeriesTracker::default();
        tr.observe(&sample(&[1, 2], 3.0), t(0));
        tr.observe(&sample(&[1, 2, 3], 4.0), t(0));
        let saved: Vec<GroupSeriesEntry> = tr.entries().cloned().collect();

        let mut back = SeriesTracker::from_entries(saved, TrackerConfig::default());
        assert_eq!(back.len(), 2);
        let ep = back.observe(&sample(&[1, 2, 3], 0.5), t(30)).unwrap();
        assert_eq!(ep.dimension, 2);
        assert_eq!(ep.length, 1);
    }
}
