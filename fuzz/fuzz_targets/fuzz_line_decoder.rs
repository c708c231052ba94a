//! Fuzz target: `LineDecoder::feed`
//!
//! Splits arbitrary input at a fuzzer-chosen point and checks that the
//! decoder yields the same line as for the unsplit input, and that no
//! line ever exceeds the receive frame.
//!
//! cargo fuzz run fuzz_line_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use regserver::proto::codec::{LINE_FRAME_LEN, LineDecoder};

fuzz_target!(|data: &[u8]| {
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(body.len());

    let mut whole = LineDecoder::new();
    let expected = whole.feed(body).or_else(|| whole.take_pending());

    let mut parts = LineDecoder::new();
    let got = parts
        .feed(&body[..split])
        .or_else(|| parts.feed(&body[split..]))
        .or_else(|| parts.take_pending());

    assert_eq!(got, expected);
    if let Some(line) = got {
        assert!(line.len() <= LINE_FRAME_LEN);
        assert!(!line.contains(&0));
    }
});
