//! On-disk outputs in the data directory.
//!
//! | File | Written |
//! |---|---|
//! | `headways_burst.json` | replaced every processed burst |
//! | `series_state.json` | replaced atomically every processed burst |
//! | `anomalies_raw.jsonl` | appended, every closed episode |
//! | `anomalies.jsonl` | appended, reportable episodes only |
//!
//! The series state is wrapped in a versioned envelope carrying a SHA-256
//! of the entries, the config hash it was produced under and the
//! fingerprint of the last processed snapshot.

use crate::emitter::AnomalyEvent;
use crate::headway::HeadwayRecord;
use crate::series::GroupSeriesEntry;
use bw_common::fsutil::write_json_pretty_atomic;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADWAYS_FILE: &str = "headways_burst.json";
pub const SERIES_STATE_FILE: &str = "series_state.json";
pub const RAW_ANOMALIES_FILE: &str = "anomalies_raw.jsonl";
pub const ANOMALIES_FILE: &str = "anomalies.jsonl";

pub const SERIES_SCHEMA_VERSION: &str = "1.0.0";

/// Persisted state older than this is discarded at startup.
pub fn default_max_state_age() -> Duration {
    Duration::seconds(600)
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<PersistError> for bw_common::Error {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Io { source, .. } => bw_common::Error::Io(source),
            PersistError::Encode { source, .. } => bw_common::Error::Json(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Headway log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadwayLog {
    pub taken_at: DateTime<Utc>,
    pub records: Vec<HeadwayRecord>,
}

// ---------------------------------------------------------------------------
// Series state envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEnvelope {
    pub schema_version: String,
    pub saved_at: DateTime<Utc>,
    pub config_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_fingerprint: Option<String>,
    /// SHA-256 hex of the `entries` JSON.
    pub integrity_sha256: String,
    pub entries: Vec<GroupSeriesEntry>,
}

fn entries_digest(entries: &[GroupSeriesEntry]) -> String {
    let json = serde_json::to_string(entries).unwrap_or_default();
    bw_config::hash_content(&json)
}

impl SeriesEnvelope {
    pub fn new(
        saved_at: DateTime<Utc>,
        config_hash: &str,
        snapshot_fingerprint: Option<&str>,
        entries: Vec<GroupSeriesEntry>,
    ) -> Self {
        SeriesEnvelope {
            schema_version: SERIES_SCHEMA_VERSION.to_string(),
            saved_at,
            config_hash: config_hash.to_string(),
            snapshot_fingerprint: snapshot_fingerprint.map(str::to_string),
            integrity_sha256: entries_digest(&entries),
            entries,
        }
    }

    /// Why the envelope cannot be trusted, if it cannot.
    pub fn verify(&self) -> Result<(), String> {
        let major = self.schema_version.split('.').next().unwrap_or_default();
        let expected = SERIES_SCHEMA_VERSION.split('.').next().unwrap_or_default();
        if major != expected {
            return Err(format!(
                "incompatible schema version {} (expected {})",
                self.schema_version, SERIES_SCHEMA_VERSION
            ));
        }
        if entries_digest(&self.entries) != self.integrity_sha256 {
            return Err("integrity check failed: entries SHA-256 mismatch".to_string());
        }
        if let Some(bad) = self.entries.iter().find(|e| !e.is_consistent()) {
            return Err(format!("inconsistent entry for bus group {}", bad.key));
        }
        Ok(())
    }
}

/// Outcome of reading the persisted series state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateLoad {
    Missing,
    Fresh(SeriesEnvelope),
    Stale { age_secs: i64 },
    Corrupted { reason: String },
}

// ---------------------------------------------------------------------------
// Data directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DataStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
        move |source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn write_headways(&self, log: &HeadwayLog) -> Result<PathBuf, PersistError> {
        let path = self.path(HEADWAYS_FILE);
        write_json_pretty_atomic(&path, log).map_err(Self::io_err(&path))?;
        Ok(path)
    }

    pub fn save_series(&self, envelope: &SeriesEnvelope) -> Result<PathBuf, PersistError> {
        let path = self.path(SERIES_STATE_FILE);
        write_json_pretty_atomic(&path, envelope).map_err(Self::io_err(&path))?;
        Ok(path)
    }

    /// Read the series state, judging freshness against `now`.
    pub fn load_series(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<StateLoad, PersistError> {
        let path = self.path(SERIES_STATE_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateLoad::Missing),
            Err(e) => return Err(Self::io_err(&path)(e)),
        };
        let envelope: SeriesEnvelope = match serde_json::from_str(&content) {
            Ok(env) => env,
            Err(e) => {
                return Ok(StateLoad::Corrupted {
                    reason: e.to_string(),
                })
            }
        };
        if let Err(reason) = envelope.verify() {
            return Ok(StateLoad::Corrupted { reason });
        }
        let age = now - envelope.saved_at;
        if age > max_age {
            return Ok(StateLoad::Stale {
                age_secs: age.num_seconds(),
            });
        }
        Ok(StateLoad::Fresh(envelope))
    }

    /// Append events as JSON lines to `file`.
    pub fn append_anomalies(&self, file: &str, events: &[AnomalyEvent]) -> Result<(), PersistError> {
        if events.is_empty() {
            return Ok(());
        }
        let path = self.path(file);
        std::fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;
        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Self::io_err(&path))?;
        let mut writer = BufWriter::new(handle);
        for event in events {
            let line = serde_json::to_string(event).map_err(|source| PersistError::Encode {
                path: path.clone(),
                source,
            })?;
            writeln!(writer, "{line}").map_err(Self::io_err(&path))?;
        }
        writer.flush().map_err(Self::io_err(&path))
    }

    /// Every event in `file`, oldest first, plus the count of unreadable lines.
    pub fn read_anomalies(&self, file: &str) -> Result<(Vec<AnomalyEvent>, usize), PersistError> {
        let path = self.path(file);
        let handle = match std::fs::File::open(&path) {
            Ok(h) => h,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(Self::io_err(&path)(e)),
        };
        let mut events = Vec::new();
        let mut skipped = 0;
        for line in BufReader::new(handle).lines() {
            let line = line.map_err(Self::io_err(&path))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnomalyEvent>(&line) {
                Ok(event) => events.push(event),
                Err(_) => skipped += 1,
            }
        }
        Ok((events, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{ClosedEpisode, ClosureReason, SeriesState};
    use bw_common::{BusGroupKey, BusId, Direction, LineId};
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn entry(buses: &[u32]) -> GroupSeriesEntry {
        let ids: Vec<BusId> = buses.iter().map(|&b| BusId(b)).collect();
        GroupSeriesEntry {
            key: BusGroupKey::from_buses(&ids).unwrap(),
            line: LineId::from("44"),
            direction: Direction::Outbound,
            dimension: ids.len() - 1,
            last_timestamp: t(0),
            last_distance: 3.5,
            state: SeriesState::start(t(0), 3.5),
        }
    }

    fn event(length: u32) -> AnomalyEvent {
        AnomalyEvent::from_episode(&ClosedEpisode {
            key: BusGroupKey::from_buses(&[BusId(1), BusId(2)]).unwrap(),
            line: LineId::from("44"),
            direction: Direction::Inbound,
            dimension: 1,
            length,
            mean_distance: 3.0,
            max_distance: 3.0,
            started_at: t(0),
            ended_at: t(30),
            closed_at: t(60),
            reason: ClosureReason::Timeout,
        })
    }

    #[test]
    fn series_state_roundtrip_and_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());
        assert_eq!(
            store.load_series(t(0), default_max_state_age()).unwrap(),
            StateLoad::Missing
        );

        let env = SeriesEnvelope::new(t(0), "cfg", Some("fp"), vec![entry(&[1, 2]), entry(&[1, 2, 3])]);
        store.save_series(&env).unwrap();

        match store.load_series(t(599), default_max_state_age()).unwrap() {
            StateLoad::Fresh(back) => {
                assert_eq!(back.entries.len(), 2);
                assert_eq!(back.snapshot_fingerprint.as_deref(), Some("fp"));
            }
            other => panic!("expected fresh state, got {other:?}"),
        }
        assert_eq!(
            store.load_series(t(601), default_max_state_age()).unwrap(),
            StateLoad::Stale { age_secs: 601 }
        );
    }

    #[test]
    fn tampered_or_garbled_state_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());
        let mut env = SeriesEnvelope::new(t(0), "cfg", None, vec![entry(&[1, 2])]);
        env.entries[0].last_distance = 99.0;
        store.save_series(&env).unwrap();
        assert!(matches!(
            store.load_series(t(1), default_max_state_age()).unwrap(),
            StateLoad::Corrupted { .. }
        ));

        std::fs::write(store.path(SERIES_STATE_FILE), "{not json").unwrap();
        assert!(matches!(
            store.load_series(t(1), default_max_state_age()).unwrap(),
            StateLoad::Corrupted { .. }
        ));
    }

    #[test]
    fn anomalies_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path().join("data"));
        store.append_anomalies(RAW_ANOMALIES_FILE, &[event(1)]).unwrap();
        store
            .append_anomalies(RAW_ANOMALIES_FILE, &[event(2), event(3)])
            .unwrap();
        store.append_anomalies(ANOMALIES_FILE, &[]).unwrap();
        assert!(!store.path(ANOMALIES_FILE).exists());

        let mut f = OpenOptions::new()
            .append(true)
            .open(store.path(RAW_ANOMALIES_FILE))
            .unwrap();
        writeln!(f, "garbage").unwrap();

        let (events, skipped) = store.read_anomalies(RAW_ANOMALIES_FILE).unwrap();
        let lengths: Vec<u32> = events.iter().map(|e| e.episode_length).collect();
        assert_eq!(lengths, vec![1, 2, 3]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn headway_log_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());
        let log = HeadwayLog {
            taken_at: t(0),
            records: Vec::new(),
        };
        store.write_headways(&log).unwrap();
        let path = store
            .write_headways(&HeadwayLog {
                taken_at: t(30),
                ..log
            })
            .unwrap();
        let back: HeadwayLog =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.taken_at, t(30));
    }

    fn anomalous_entry(buses: &[u32], sum: f64, max: f64, last: f64) -> GroupSeriesEntry {
        GroupSeriesEntry {
            last_distance: last,
            state: SeriesState::Anomalous {
                run: 3,
                started_at: t(0),
                last_anomalous_at: t(60),
                distance_sum: sum,
                distance_max: max,
            },
            ..entry(buses)
        }
    }

    #[test]
    fn distances_survive_reload_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());
        // Shortest-repr decimals that a lossy parser reads back 1 ULP off
        let sum = 1.8002723770824787_f64;
        let env = SeriesEnvelope::new(
            t(60),
            "cfg",
            None,
            vec![
                anomalous_entry(&[1, 2], sum, 0.1 + 0.2, 2.0 / 3.0),
                anomalous_entry(&[4, 5, 6], 7.123456789012345e-3, 1e300 / 3.0, sum / 7.0),
            ],
        );
        store.save_series(&env).unwrap();

        match store.load_series(t(61), default_max_state_age()).unwrap() {
            StateLoad::Fresh(back) => {
                assert_eq!(back.entries, env.entries);
                assert_eq!(back.integrity_sha256, env.integrity_sha256);
            }
            other => panic!("expected fresh state, got {other:?}"),
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn saved_state_reloads_fresh(
                distances in prop::collection::vec((0.0f64..1e4, 0.0f64..1e3, 0.0f64..1e3), 1..6)
            ) {
                let dir = tempfile::tempdir().unwrap();
                let store = DataStore::new(dir.path());
                let entries: Vec<GroupSeriesEntry> = distances
                    .iter()
                    .enumerate()
                    .map(|(i, &(sum, max, last))| {
                        let first = 10 * i as u32 + 1;
                        anomalous_entry(&[first, first + 1], sum, max, last)
                    })
                    .collect();
                store
                    .save_series(&SeriesEnvelope::new(t(0), "cfg", Some("fp"), entries.clone()))
                    .unwrap();

                match store.load_series(t(30), default_max_state_age()).unwrap() {
                    StateLoad::Fresh(back) => prop_assert_eq!(back.entries, entries),
                    other => prop_assert!(false, "expected fresh state, got {:?}", other),
                }
            }
        }
    }
}
