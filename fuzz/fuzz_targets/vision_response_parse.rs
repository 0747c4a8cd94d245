//! Fuzz target for vision service response parsing.
//!
//! This fuzzer feeds arbitrary text to the annotate response parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use scanfuse::detect::{parse_annotate_response, VisionOptions};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    let options = VisionOptions {
        text_regions: true,
        ..Default::default()
    };
    let _ = parse_annotate_response(body, &options);
});
