#![no_main]

use libfuzzer_sys::fuzz_target;
use subbot_sse::SseEventParser;

fuzz_target!(|data: &[u8]| {
    let mut parser = SseEventParser::new();

    for line in data.split(|byte| *byte == b'\n') {
        match parser.feed(line.trim_ascii()) {
            Ok(true) => {
                let event = parser.take_event();
                assert!(!event.id.starts_with(|ch: char| ch.is_ascii_whitespace()));
                assert!(parser.take_event().payload.is_empty());
            }
            Ok(false) => {}
            Err(error) => {
                assert!(!error.to_string().is_empty());
                break;
            }
        }
    }
});
