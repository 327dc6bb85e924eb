//! Fuzz target for poller snapshots.
//!
//! Malformed samples must be counted, never fail the whole snapshot.

#![no_main]

use bw_core::ingest::Snapshot;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(snapshot) = Snapshot::from_json(text) {
        assert_eq!(snapshot.fingerprint().len(), 64);
    }
});
