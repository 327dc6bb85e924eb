//! Shared fixtures for the bw-core integration tests.
#![allow(dead_code)]

use bw_config::{load_config, ConfigPaths, LoadedConfig};
use bw_core::ingest::Snapshot;
use bw_core::logging::LogContext;
use bw_core::Detector;
use std::path::{Path, PathBuf};

pub const BUNCHED_1: &str = "burst_bunched_1.json";
pub const BUNCHED_2: &str = "burst_bunched_2.json";
pub const CLEAN: &str = "burst_clean.json";

pub fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test/fixtures")
}

pub fn config_dir() -> PathBuf {
    fixtures().join("config")
}

pub fn snapshot_path(name: &str) -> PathBuf {
    fixtures().join("snapshots").join(name)
}

pub fn snapshot(name: &str) -> Snapshot {
    Snapshot::read(&snapshot_path(name)).expect("fixture snapshot should parse")
}

/// Copy of the fixture config that a test may edit.
pub fn config_copy(into: &Path) -> PathBuf {
    let dir = into.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    for entry in std::fs::read_dir(config_dir()).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), dir.join(entry.file_name())).unwrap();
    }
    dir
}

pub fn load(config_dir: &Path, data_dir: &Path) -> LoadedConfig {
    load_config(&ConfigPaths::explicit(config_dir, data_dir)).expect("fixture config should load")
}

pub fn detector(config_dir: &Path, data_dir: &Path) -> Detector {
    Detector::new(
        load(config_dir, data_dir),
        LogContext::new("run-test", "host-test"),
    )
}
