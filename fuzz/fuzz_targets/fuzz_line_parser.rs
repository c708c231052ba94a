//! Fuzz target: request parsing and response framing
//!
//! Pushes arbitrary lines through `RegisterService::handle_line` and
//! checks that every outcome renders to a terminated 20-byte frame.
//!
//! cargo fuzz run fuzz_line_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use regserver::app::service::RegisterService;
use regserver::config::ServerConfig;
use regserver::proto::request::{self, MAX_LINE_LEN, ProtocolError};
use regserver::proto::response::{RESPONSE_FRAME_LEN, Response};

fuzz_target!(|data: &[u8]| {
    let parsed = request::parse(data);
    if data.len() > MAX_LINE_LEN {
        assert_eq!(parsed, Err(ProtocolError::IllegalLength));
    }

    let mut svc = RegisterService::new(&ServerConfig::default());
    let response = svc.handle_line(data);
    match response {
        Response::Rejected(e) => assert_eq!(parsed, Err(e)),
        _ => assert!(parsed.is_ok()),
    }

    let frame = response.frame();
    assert_eq!(frame[RESPONSE_FRAME_LEN - 1], 0, "frame must stay terminated");
});
