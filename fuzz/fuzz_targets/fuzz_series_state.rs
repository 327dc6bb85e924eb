//! Fuzz target for the persisted series state envelope.

#![no_main]

use bw_core::persist::SeriesEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = serde_json::from_slice::<SeriesEnvelope>(data) {
        let _ = envelope.verify();
    }
});
