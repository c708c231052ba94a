//! End-to-end protocol scenarios through the connection handler.
//!
//! Bytes go in through a scripted transport, the line is handled by a
//! real `RegisterService`, and the 20-byte frame that comes back out is
//! checked byte for byte.

use std::net::Ipv4Addr;
use std::time::Duration;

use regserver::app::events::ConnectionRecord;
use regserver::app::service::RegisterService;
use regserver::config::ServerConfig;
use regserver::proto::codec::LineDecoder;
use regserver::proto::io_task::{self, Exchange, ListenerTiming};
use regserver::proto::response::RESPONSE_FRAME_LEN;
use regserver::proto::transport::{SecurityMode, TransportError};

use crate::mock_transport::{MockTransport, Step};

fn timing() -> ListenerTiming {
    ListenerTiming {
        recv_timeout: Duration::from_millis(20),
        accept_poll: Duration::from_millis(1),
        read_poll: Duration::from_millis(1),
    }
}

fn service(capacity: usize) -> RegisterService {
    RegisterService::new(&ServerConfig {
        store_capacity: capacity,
        ..ServerConfig::default()
    })
}

/// Pad a request into a 20-byte NUL-terminated packet.
fn packet(line: &str) -> String {
    let mut p = line.to_owned();
    while p.len() < 20 {
        p.push('\0');
    }
    p
}

/// Run one connection and return (exchange, response text on the wire).
fn exchange(svc: &mut RegisterService, t: &mut MockTransport) -> (Exchange, String) {
    let mut decoder = LineDecoder::new();
    let ex = io_task::serve_connection(t, &mut decoder, &timing(), |line| svc.handle_line(&line))
        .expect("transport ok")
        .expect("line received");
    (ex, t.response_text())
}

fn send(svc: &mut RegisterService, line: &str) -> String {
    let mut t = MockTransport::sending(&[packet(line).as_str()]);
    exchange(svc, &mut t).1
}

// ── Scenarios ─────────────────────────────────────────────────

#[test]
fn write_then_read_back() {
    let mut svc = service(400);
    assert_eq!(send(&mut svc, "W00AA01BEEF"), "A00AA01BEEF");
    assert_eq!(send(&mut svc, "R00AA01"), "A00AA01BEEF");
}

#[test]
fn read_of_unknown_key() {
    let mut svc = service(400);
    assert_eq!(send(&mut svc, "R00AA01"), "X Not Found");
}

#[test]
fn unknown_command_letter() {
    let mut svc = service(400);
    assert_eq!(send(&mut svc, "ZZZZZZZZZZZ"), "X illegal command");
}

#[test]
fn thirteen_hex_digits_is_a_length_error() {
    let mut svc = service(400);
    assert_eq!(send(&mut svc, "0123456789ABC"), "X illegal length");
}

#[test]
fn non_hex_digit_in_read() {
    let mut svc = service(400);
    assert_eq!(send(&mut svc, "R00AA0G"), "X illegal character");
}

#[test]
fn full_store_rejects_new_keys_only() {
    let mut svc = service(3);
    for reg in 0..3 {
        let reply = send(&mut svc, &format!("W0001{reg:02X}0000"));
        assert!(reply.starts_with('A'), "write {reg} failed: {reply}");
    }
    assert_eq!(send(&mut svc, "W0002000000"), "X Database Full 3");
    // Existing keys stay writable.
    assert_eq!(send(&mut svc, "W000101FFFF"), "A000101FFFF");
    assert_eq!(svc.store().count(), 3);
}

// ── Framing over the wire ─────────────────────────────────────

#[test]
fn response_is_a_padded_frame_and_flushed() {
    let mut svc = service(400);
    let mut t = MockTransport::sending(&[packet("W12340100FF").as_str()]);
    let (ex, text) = exchange(&mut svc, &mut t);
    assert!(ex.delivered);
    assert_eq!(text, "A12340100FF");
    assert_eq!(t.written.len(), RESPONSE_FRAME_LEN);
    assert!(t.written[11..].iter().all(|&b| b == 0));
    assert_eq!(t.flushes, 1);
}

#[test]
fn lowercase_hex_is_echoed_uppercase() {
    let mut svc = service(400);
    assert_eq!(send(&mut svc, "Wabcd0ef00d"), "AABCD0EF00D");
    assert_eq!(send(&mut svc, "RABCD0E"), "AABCD0EF00D");
}

#[test]
fn request_split_across_reads_with_crlf() {
    let mut svc = service(400);
    let mut t = MockTransport::scripted(vec![
        Step::Data(b"W00".to_vec()),
        Step::Idle,
        Step::Data(b"AA01".to_vec()),
        Step::Data(b"BEEF\r\n".to_vec()),
    ]);
    let (ex, text) = exchange(&mut svc, &mut t);
    assert_eq!(&ex.line[..], b"W00AA01BEEF");
    assert_eq!(text, "A00AA01BEEF");
}

#[test]
fn unterminated_line_handled_after_timeout() {
    let mut svc = service(400);
    let mut t = MockTransport::sending(&["R00AA01"]);
    assert_eq!(exchange(&mut svc, &mut t).1, "X Not Found");
}

#[test]
fn unterminated_line_answered_after_half_close() {
    let mut svc = service(400);
    let mut t = MockTransport::sending(&["W00AA01", "BEEF"]).then_close();
    let (ex, text) = exchange(&mut svc, &mut t);
    assert_eq!(ex.response.text().as_str(), "A00AA01BEEF");
    assert_eq!(text, "A00AA01BEEF");
    assert_eq!(t.written.len(), RESPONSE_FRAME_LEN);
}

#[test]
fn connection_lost_mid_line_leaves_store_untouched() {
    let mut svc = service(400);
    let mut t = MockTransport::scripted(vec![
        Step::Data(b"W00AA01".to_vec()),
        Step::Fail(TransportError::NotConnected),
    ]);
    let mut decoder = LineDecoder::new();
    let result = io_task::serve_connection(&mut t, &mut decoder, &timing(), |line| {
        svc.handle_line(&line)
    });
    assert_eq!(result, Err(TransportError::NotConnected));
    assert!(t.written.is_empty());
    assert_eq!(svc.store().count(), 0);
    assert_eq!(svc.stats().total(), 0);
}

#[test]
fn silent_client_gets_no_response() {
    let mut svc = service(400);
    let mut t = MockTransport::sending(&[]);
    let mut decoder = LineDecoder::new();
    let result = io_task::serve_connection(&mut t, &mut decoder, &timing(), |line| {
        svc.handle_line(&line)
    });
    assert_eq!(result, Ok(None));
    assert!(t.written.is_empty());
    assert_eq!(svc.stats().total(), 0);
}

#[test]
fn unpadded_full_frame_is_a_length_error() {
    let mut svc = service(400);
    let mut t = MockTransport::sending(&["W00AA01BEEFW00AA01BE"]);
    assert_eq!(exchange(&mut svc, &mut t).1, "X illegal length");
}

// ── Connection records ────────────────────────────────────────

#[test]
fn connection_record_lines() {
    let mut svc = service(400);
    let peer = Ipv4Addr::new(192, 168, 1, 20);

    let mut t = MockTransport::sending(&[packet("W00AA01BEEF").as_str()]);
    let (ex, _) = exchange(&mut svc, &mut t);
    let rec = ConnectionRecord::new(peer, SecurityMode::Secure, &ex.line, &ex.response);
    assert_eq!(
        rec.to_string(),
        "Connection from IP: 192.168.1.20\tConnection: Secure\t\
         Message: W00AA01BEEF\tResponse: A00AA01BEEF"
    );

    let mut t = MockTransport::sending(&[packet("Q1").as_str()]);
    let (ex, _) = exchange(&mut svc, &mut t);
    let rec = ConnectionRecord::new(peer, SecurityMode::NonSecure, &ex.line, &ex.response);
    assert_eq!(
        rec.to_string(),
        "Connection from IP: 192.168.1.20\tConnection: Non-Secure\t\
         Message: Length: 2\tResponse: X illegal command"
    );
}
