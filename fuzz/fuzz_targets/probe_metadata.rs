#![no_main]

use libfuzzer_sys::fuzz_target;
use optipress::engine::{decoder::detect_format, probe_metadata};

fuzz_target!(|data: &[u8]| {
    let _ = detect_format(data);
    if let Ok(meta) = probe_metadata(data) {
        // a successful probe has already passed the bomb guard
        assert!(meta.width as u64 * meta.height as u64 <= optipress::engine::MAX_PIXELS);
    }
});
