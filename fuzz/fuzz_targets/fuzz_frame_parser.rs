#![no_main]

use libfuzzer_sys::fuzz_target;
use streamable_http_transport::sse::parse_frames;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for frame in parse_frames(text.lines()) {
        // The separator after the last data line is always stripped.
        assert!(!frame.data.ends_with('\n'));
        let _ = frame.resumption_id();
    }
});
