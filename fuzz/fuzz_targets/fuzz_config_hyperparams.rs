//! Fuzz target for hyperparams.json parsing.

#![no_main]

use bw_config::validate::validate_hyperparams;
use bw_config::Hyperparams;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(hp) = serde_json::from_slice::<Hyperparams>(data) {
        let _ = validate_hyperparams(&hp);
    }
});
