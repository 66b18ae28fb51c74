//! Fuzz target: operator timestamp parser
//!
//! Drives `parse_timestamp` with arbitrary UTF-8 and verifies:
//! - No panics under arbitrary input
//! - Accepted input re-formatted as `DD/MM/YYYY HH:MM:SS` parses back to
//!   the same instant
//!
//! cargo fuzz run fuzz_time_parser

#![no_main]

use aquadoser::clock::parse_timestamp;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(parsed) = parse_timestamp(input) else {
        return;
    };

    let canonical = parsed.format("%d/%m/%Y %H:%M:%S").to_string();
    assert_eq!(parse_timestamp(&canonical), Ok(parsed));
});
