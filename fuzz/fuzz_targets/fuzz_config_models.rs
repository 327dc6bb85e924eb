//! Fuzz target for the model store.
//!
//! Compiling a parsed store inverts every covariance matrix, so this also
//! exercises the Cholesky path on arbitrary shapes and values.

#![no_main]

use bw_config::{CompiledModels, ModelStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(store) = serde_json::from_slice::<ModelStore>(data) else {
        return;
    };
    let models = CompiledModels::compile(&store);
    let _ = models.issues();
    for (line, slot, _) in store.slices() {
        if let Some(slice) = models.slice(line, slot) {
            for d in 1..=slice.max_dim {
                if let Ok(model) = slice.model(d) {
                    let _ = model.distance(&vec![300.0; d]);
                }
            }
        }
    }
});
