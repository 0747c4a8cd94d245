//! Fuzz target for barcode decoder results.
//!
//! Parses arbitrary JSON as decoder output and pushes every localization
//! through the normalizer. Malformed geometry must come back as an error,
//! never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use scanfuse::detect::BarcodeResult;
use scanfuse::geometry::{normalize, Dimensions};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(results) = serde_json::from_slice::<Vec<BarcodeResult>>(data) else {
        return;
    };
    let displayed = Dimensions::new(640.0, 480.0);
    for result in results {
        if let Some(raw) = result.localization_result {
            let _ = normalize(&raw.into_localization(), displayed);
        }
    }
});
