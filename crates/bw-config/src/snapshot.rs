//! Configuration snapshots for provenance.
//!
//! A snapshot records exactly which files the detector was started with.
//! Its combined hash is stamped into the persisted series state so a
//! restart can tell whether the tracked entries were built against the
//! same models.

use crate::calendar::ServiceCalendar;
use crate::load::ConfigFile;
use crate::models::{CompiledModels, ModelStore};
use crate::resolve::ConfigPaths;
use crate::topology::Topology;
use crate::travel_times::TravelTimes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDigest {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
}

impl FileDigest {
    pub fn new(file: ConfigFile, path: &Path, content: &str) -> Self {
        FileDigest {
            name: file.file_name().to_string(),
            path: path.display().to_string(),
            sha256: hash_content(content),
            bytes: content.len(),
        }
    }
}

/// Key figures of the loaded configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub lines: Vec<String>,
    pub travel_segments: usize,
    pub model_slices: usize,
    /// Dimensions disabled at load (bad shape, singular covariance).
    pub model_issues: usize,
    pub hour_ranges: Vec<String>,
    pub holidays: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub timestamp: DateTime<Utc>,
    pub schema_version: String,
    #[serde(default)]
    pub config_dir: Option<String>,
    pub config_source: String,
    pub data_dir: String,
    pub files: Vec<FileDigest>,
    /// Hash over every file hash, in load order.
    pub combined_hash: String,
    pub summary: ConfigSummary,
}

impl ConfigSnapshot {
    pub fn new(
        paths: &ConfigPaths,
        files: Vec<FileDigest>,
        topology: &Topology,
        travel_times: &TravelTimes,
        store: &ModelStore,
        models: &CompiledModels,
        calendar: &ServiceCalendar,
    ) -> Self {
        let combined = files
            .iter()
            .map(|f| format!("{}={}", f.name, f.sha256))
            .collect::<Vec<_>>()
            .join(";");

        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            config_dir: paths.config_dir.as_ref().map(|p| p.display().to_string()),
            config_source: paths.config_source.to_string(),
            data_dir: paths.data_dir.display().to_string(),
            files,
            combined_hash: hash_content(&combined),
            summary: ConfigSummary {
                lines: topology.line_ids().map(|l| l.to_string()).collect(),
                travel_segments: travel_times.segments().len(),
                model_slices: store.slice_count(),
                model_issues: models.issues().len(),
                hour_ranges: calendar.hour_ranges.iter().map(|r| r.to_string()).collect(),
                holidays: calendar.holidays.len(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.combined_hash == other.combined_hash
    }

    /// First 12 characters of the combined hash.
    pub fn short_id(&self) -> &str {
        &self.combined_hash[..12.min(self.combined_hash.len())]
    }
}

/// SHA-256 of `content`, hex encoded.
pub fn hash_content(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
