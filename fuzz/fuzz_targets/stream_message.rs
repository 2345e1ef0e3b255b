#![no_main]

use chrono::DateTime;
use crowdwatch_core::{MonitorController, SERIES_CAPACITY};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes off the wire must never panic the controller, and the
// aggregator bounds must hold afterwards.
fuzz_target!(|data: &[u8]| {
    let now = DateTime::from_timestamp(0, 0).unwrap_or_default();
    let mut controller = MonitorController::new();
    for chunk in data.split(|b| *b == b'\n') {
        controller.handle_stream_bytes(chunk, now);
        if let Ok(text) = std::str::from_utf8(chunk) {
            controller.handle_stream_text(text, now);
        }
    }
    let view = controller.view();
    assert!(view.series.len() <= SERIES_CAPACITY);
    assert!(view.evidence.windows(2).all(|w| w[0].frame_index < w[1].frame_index));
});
