//! Arrival snapshots written by the poller.
//!
//! ```json
//! {"taken_at": "2026-03-10T09:00:00Z",
//!  "samples": [{"line": "44", "destination": "CAMPUS", "stop": 105, "bus": 11,
//!               "eta_secs": 30, "distance_m": 200}]}
//! ```
//!
//! The poller's field names (`estimateArrive`, `DistanceBus`) are accepted
//! as aliases. A sample that does not parse is counted and skipped; only
//! an unreadable file or a broken envelope fails the burst.

pub mod clean;

pub use clean::{check_sample, clean_samples, CleanReport, CleanSample, DropReason};

use bw_common::{BusId, LineId, StopId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalSample {
    pub line: LineId,
    /// Headsign; selects the direction.
    pub destination: String,
    pub stop: StopId,
    pub bus: BusId,
    #[serde(alias = "estimateArrive")]
    pub eta_secs: f64,
    /// Distance still to travel to `stop`.
    #[serde(alias = "DistanceBus")]
    pub distance_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    taken_at: DateTime<Utc>,
    #[serde(default)]
    samples: Vec<serde_json::Value>,
}

/// One burst of arrival estimates.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub samples: Vec<ArrivalSample>,
    /// Entries that could not be read as a sample.
    pub malformed: usize,
    fingerprint: String,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("snapshot not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<IngestError> for bw_common::Error {
    fn from(err: IngestError) -> Self {
        bw_common::Error::Ingest(err.to_string())
    }
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>, samples: Vec<ArrivalSample>) -> Self {
        let raw: Vec<serde_json::Value> = samples
            .iter()
            .filter_map(|s| serde_json::to_value(s).ok())
            .collect();
        Snapshot {
            taken_at,
            samples,
            malformed: 0,
            fingerprint: fingerprint_of(&raw),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawSnapshot = serde_json::from_str(text)?;
        let fingerprint = fingerprint_of(&raw.samples);
        let total = raw.samples.len();
        let samples: Vec<ArrivalSample> = raw
            .samples
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        Ok(Snapshot {
            taken_at: raw.taken_at,
            malformed: total - samples.len(),
            samples,
            fingerprint,
        })
    }

    pub fn read(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IngestError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                IngestError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Snapshot::from_json(&text).map_err(|source| IngestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Hash of the sample rows. Two snapshots with the same rows are the
    /// same burst even if `taken_at` moved.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint_of(samples: &[serde_json::Value]) -> String {
    let bytes = serde_json::to_vec(samples).unwrap_or_default();
    bw_config::hash_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SAMPLES: &str = r#"{
        "taken_at": "2026-03-10T09:00:00Z",
        "samples": [
            {"line": "44", "destination": "CAMPUS", "stop": 105, "bus": 11,
             "eta_secs": 30, "distance_m": 200},
            {"line": "44", "destination": "CAMPUS", "stop": 104, "bus": 12,
             "estimateArrive": 95, "DistanceBus": 410, "timestamp": "2026-03-10T08:59:58Z"}
        ]}"#;

    #[test]
    fn parses_both_field_spellings() {
        let snap = Snapshot::from_json(TWO_SAMPLES).unwrap();
        assert_eq!(snap.samples.len(), 2);
        assert_eq!(snap.malformed, 0);
        assert_eq!(snap.samples[1].eta_secs, 95.0);
        assert_eq!(snap.samples[1].distance_m, 410.0);
        assert!(snap.samples[0].timestamp.is_none());
        assert_eq!(snap.fingerprint().len(), 64);
    }

    #[test]
    fn malformed_rows_are_counted_not_fatal() {
        let snap = Snapshot::from_json(
            r#"{"taken_at": "2026-03-10T09:00:00Z", "samples": [
                {"line": "44", "destination": "CAMPUS", "stop": 105, "bus": 11,
                 "eta_secs": 30, "distance_m": 200},
                {"line": "44", "stop": "not-a-number"},
                17
            ]}"#,
        )
        .unwrap();
        assert_eq!(snap.samples.len(), 1);
        assert_eq!(snap.malformed, 2);
    }

    #[test]
    fn fingerprint_ignores_taken_at() {
        let a = Snapshot::from_json(TWO_SAMPLES).unwrap();
        let b = Snapshot::from_json(&TWO_SAMPLES.replace("09:00:00Z", "09:00:07Z")).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = Snapshot::from_json(&TWO_SAMPLES.replace("\"eta_secs\": 30", "\"eta_secs\": 31"))
            .unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn broken_envelope_fails() {
        assert!(Snapshot::from_json(r#"{"samples": []}"#).is_err());
        let dir = tempfile::tempdir().unwrap();
        let err = Snapshot::read(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
        let common: bw_common::Error = err.into();
        assert_eq!(common.code(), 20);
    }
}
