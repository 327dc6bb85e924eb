//! Fuzz target for topology.json parsing and validation.

#![no_main]

use bw_config::validate::validate_topology;
use bw_config::Topology;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(topology) = serde_json::from_slice::<Topology>(data) {
        let _ = validate_topology(&topology);
    }
});
