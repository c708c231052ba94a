//! Listener task: one thread per listener, one client at a time.
//!
//! ```text
//!  ┌─────────────────────────────────────────────────────────┐
//!  │  Listener thread (tcp-io / tls-io)                      │
//!  │                                                         │
//!  │  accept ──▶ read line ──▶ bus.exchange ──▶ send frame   │
//!  │    ▲        (recv timeout)  (blocks on dispatcher)  │   │
//!  │    └──────────── disconnect ◀─── ConnectionRecord ◀─┘   │
//!  └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Accept and read are non-blocking polls paced by `accept_poll` and
//! `read_poll`.  The exchange parks the thread on the request bus until
//! the dispatcher answers.

use std::net::Ipv4Addr;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use futures_lite::future;
use log::{info, warn};

use super::channels::RequestBus;
use super::codec::{Line, LineDecoder};
use super::response::Response;
use super::transport::{SecurityMode, Transport, TransportError};
use crate::adapters::log_sink::LogEventSink;
use crate::adapters::tcp_server::ServerTransport;
use crate::app::events::{AppEvent, ConnectionRecord};
use crate::app::ports::EventSink;
use crate::config::ServerConfig;
use crate::drivers::task_pin::{Core, TaskSpec};

const READ_BUF_SIZE: usize = 64;

/// Polling and timeout intervals for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTiming {
    /// How long a client may stay silent after its last byte before the
    /// pending bytes are taken as the line (or the connection is dropped).
    pub recv_timeout: Duration,
    pub accept_poll: Duration,
    pub read_poll: Duration,
}

impl ListenerTiming {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            recv_timeout: config.recv_timeout(),
            accept_poll: Duration::from_millis(u64::from(config.accept_poll_ms)),
            read_poll: Duration::from_millis(u64::from(config.read_poll_ms)),
        }
    }
}

/// One completed request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub line: Line,
    pub response: Response,
    /// Whether the response frame reached the transport.
    pub delivered: bool,
}

// ── Connection handling (transport-generic) ──────────────────

/// Read bytes until the decoder yields a line.
///
/// The receive timeout runs from the last byte received.  Returns
/// `Ok(None)` if the client sent nothing before going idle or before
/// half-closing.  A connection that is torn down mid-line is an error:
/// no response could reach the client, so the line is not handled.
pub fn read_line<T>(
    transport: &mut T,
    decoder: &mut LineDecoder,
    timing: &ListenerTiming,
) -> Result<Option<Line>, TransportError>
where
    T: Transport<Error = TransportError>,
{
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut last_rx = Instant::now();
    loop {
        match transport.read(&mut buf) {
            Ok(0) => {
                if last_rx.elapsed() >= timing.recv_timeout {
                    return Ok(decoder.take_pending());
                }
                std::thread::sleep(timing.read_poll);
            }
            Ok(n) => {
                last_rx = Instant::now();
                if let Some(line) = decoder.feed(&buf[..n]) {
                    return Ok(Some(line));
                }
            }
            // Client finished sending; it can still read the response.
            Err(TransportError::PeerClosed) => return Ok(decoder.take_pending()),
            Err(e) => return Err(e),
        }
    }
}

/// Write a whole frame, retrying short writes until the receive timeout.
pub fn send_frame<T>(
    transport: &mut T,
    frame: &[u8],
    timing: &ListenerTiming,
) -> Result<(), TransportError>
where
    T: Transport<Error = TransportError>,
{
    let started = Instant::now();
    let mut sent = 0;
    while sent < frame.len() {
        match transport.write(&frame[sent..])? {
            0 => {
                if started.elapsed() >= timing.recv_timeout {
                    return Err(TransportError::Io);
                }
                std::thread::sleep(timing.read_poll);
            }
            n => sent += n,
        }
    }
    transport.flush()
}

/// Serve one accepted client: read a line, exchange it, send the frame.
///
/// `exchange` maps the request line to its response (over the bus in
/// production, directly against a service in tests).
pub fn serve_connection<T>(
    transport: &mut T,
    decoder: &mut LineDecoder,
    timing: &ListenerTiming,
    exchange: impl FnOnce(Line) -> Response,
) -> Result<Option<Exchange>, TransportError>
where
    T: Transport<Error = TransportError>,
{
    let Some(line) = read_line(transport, decoder, timing)? else {
        return Ok(None);
    };
    let response = exchange(line.clone());
    let delivered = match send_frame(transport, &response.frame(), timing) {
        Ok(()) => true,
        Err(e) => {
            warn!("IO: response not delivered: {}", e);
            false
        }
    };
    Ok(Some(Exchange {
        line,
        response,
        delivered,
    }))
}

// ── Listener loop ────────────────────────────────────────────

/// Emit the outcome of one connection.
fn report(
    sink: &mut impl EventSink,
    mode: SecurityMode,
    peer: Ipv4Addr,
    outcome: Result<Option<Exchange>, TransportError>,
) {
    match outcome {
        Ok(Some(ex)) => {
            sink.emit(&AppEvent::Exchange(ConnectionRecord::new(
                peer,
                mode,
                &ex.line,
                &ex.response,
            )));
        }
        Ok(None) => sink.emit(&AppEvent::ReceiveTimeout { mode, peer }),
        Err(e) => warn!("IO[{}]: connection from {} failed: {}", mode.tag(), peer, e),
    }
}

/// Run a listener forever.
pub fn run_listener(
    mut transport: ServerTransport,
    bus: &RequestBus,
    timing: ListenerTiming,
    sink: &mut impl EventSink,
) -> ! {
    let mode = transport.mode();
    let mut decoder = LineDecoder::new();
    sink.emit(&AppEvent::ListenerStarted {
        mode,
        port: transport.local_port(),
    });

    loop {
        let Some(peer) = transport.accept() else {
            std::thread::sleep(timing.accept_poll);
            continue;
        };
        decoder.reset();
        let outcome = serve_connection(&mut transport, &mut decoder, &timing, |line| {
            future::block_on(bus.exchange(mode, line))
        });
        report(sink, mode, peer, outcome);
        transport.disconnect();
    }
}

// ── Thread spawn ─────────────────────────────────────────────

fn task_spec(mode: SecurityMode) -> TaskSpec {
    match mode {
        SecurityMode::NonSecure => TaskSpec {
            core: Core::Pro,
            priority: 10,
            stack_kb: 8,
            name: "tcp-io\0",
        },
        // mbedTLS handshakes need the larger stack.
        SecurityMode::Secure => TaskSpec {
            core: Core::Pro,
            priority: 10,
            stack_kb: 16,
            name: "tls-io\0",
        },
    }
}

/// Spawn the listener for `transport` on its own core-pinned thread.
pub fn spawn(
    transport: ServerTransport,
    bus: &'static RequestBus,
    timing: ListenerTiming,
) -> std::io::Result<JoinHandle<()>> {
    let spec = task_spec(transport.mode());
    info!(
        "IO[{}]: starting listener on port {}",
        transport.mode().tag(),
        transport.local_port()
    );
    spec.spawn(move || {
        let mut sink = LogEventSink::new();
        run_listener(transport, bus, timing, &mut sink);
    })
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    enum Step {
        Data(&'static [u8]),
        /// Client stays quiet for this long (one read returns 0).
        Pause(Duration),
        Fail(TransportError),
    }

    /// Scripted transport: each read consumes one step; an empty script
    /// reads as an idle client.
    struct Scripted {
        steps: VecDeque<Step>,
        written: Vec<u8>,
        write_budget: usize,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                written: Vec::new(),
                write_budget: usize::MAX,
            }
        }
    }

    impl Transport for Scripted {
        type Error = TransportError;

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            match self.steps.pop_front() {
                Some(Step::Data(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(Step::Pause(d)) => {
                    std::thread::sleep(d);
                    Ok(0)
                }
                Some(Step::Fail(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            // Accept at most `write_budget` bytes per call.
            let n = data.len().min(self.write_budget);
            self.written.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn available(&self) -> bool {
            true
        }
    }

    fn timing() -> ListenerTiming {
        ListenerTiming {
            recv_timeout: Duration::from_millis(30),
            accept_poll: Duration::from_millis(1),
            read_poll: Duration::from_millis(1),
        }
    }

    #[test]
    fn line_split_across_reads() {
        let mut t = Scripted::new(vec![
            Step::Data(b"W00A"),
            Step::Pause(Duration::ZERO),
            Step::Data(b"A01BEEF\n"),
        ]);
        let mut d = LineDecoder::new();
        let line = read_line(&mut t, &mut d, &timing()).unwrap();
        assert_eq!(line.as_deref(), Some(&b"W00AA01BEEF"[..]));
    }

    #[test]
    fn timeout_flushes_pending_bytes() {
        let mut t = Scripted::new(vec![Step::Data(b"R00AA01")]);
        let mut d = LineDecoder::new();
        let line = read_line(&mut t, &mut d, &timing()).unwrap();
        assert_eq!(line.as_deref(), Some(&b"R00AA01"[..]));
    }

    #[test]
    fn timeout_restarts_on_every_chunk() {
        // 60 ms in total, but never 50 ms without data.
        let timing = ListenerTiming {
            recv_timeout: Duration::from_millis(50),
            ..timing()
        };
        let gap = Duration::from_millis(20);
        let mut t = Scripted::new(vec![
            Step::Data(b"R00"),
            Step::Pause(gap),
            Step::Data(b"AA"),
            Step::Pause(gap),
            Step::Data(b"0"),
            Step::Pause(gap),
            Step::Data(b"1\n"),
        ]);
        let mut d = LineDecoder::new();
        let line = read_line(&mut t, &mut d, &timing).unwrap();
        assert_eq!(line.as_deref(), Some(&b"R00AA01"[..]));
    }

    #[test]
    fn silent_client_times_out() {
        let mut t = Scripted::new(vec![]);
        let mut d = LineDecoder::new();
        let started = Instant::now();
        assert_eq!(read_line(&mut t, &mut d, &timing()), Ok(None));
        assert!(started.elapsed() >= timing().recv_timeout);
    }

    #[test]
    fn half_close_after_send_still_yields_line() {
        let mut t = Scripted::new(vec![
            Step::Data(b"R0001"),
            Step::Data(b"02"),
            Step::Fail(TransportError::PeerClosed),
        ]);
        let mut d = LineDecoder::new();
        let line = read_line(&mut t, &mut d, &timing()).unwrap();
        assert_eq!(line.as_deref(), Some(&b"R000102"[..]));
    }

    #[test]
    fn torn_down_connection_drops_partial_line() {
        let mut t = Scripted::new(vec![
            Step::Data(b"W00AA01BE"),
            Step::Fail(TransportError::NotConnected),
        ]);
        let mut d = LineDecoder::new();
        let result = serve_connection(&mut t, &mut d, &timing(), |_| {
            panic!("no exchange expected")
        });
        assert_eq!(result, Err(TransportError::NotConnected));
    }

    #[test]
    fn io_error_propagates() {
        let mut t = Scripted::new(vec![Step::Fail(TransportError::Tls)]);
        let mut d = LineDecoder::new();
        assert_eq!(read_line(&mut t, &mut d, &timing()), Err(TransportError::Tls));
    }

    #[test]
    fn short_writes_are_retried() {
        let mut t = Scripted::new(vec![]);
        t.write_budget = 3;
        send_frame(&mut t, &Response::NotFound.frame(), &timing()).unwrap();
        assert_eq!(t.written.len(), 20);
        assert_eq!(&t.written[..11], b"X Not Found");
    }

    #[test]
    fn stalled_write_times_out() {
        let mut t = Scripted::new(vec![]);
        t.write_budget = 0;
        assert_eq!(
            send_frame(&mut t, b"A", &timing()),
            Err(TransportError::Io)
        );
    }

    #[test]
    fn serve_connection_sends_padded_frame() {
        let mut t = Scripted::new(vec![Step::Data(b"R00AA01\0\0\0")]);
        let mut d = LineDecoder::new();
        let ex = serve_connection(&mut t, &mut d, &timing(), |line| {
            assert_eq!(&line[..], b"R00AA01");
            Response::NotFound
        })
        .unwrap()
        .unwrap();
        assert!(ex.delivered);
        assert_eq!(ex.response, Response::NotFound);
        assert_eq!(t.written, Response::NotFound.frame().to_vec());
    }

    #[test]
    fn serve_connection_without_line_skips_exchange() {
        let mut t = Scripted::new(vec![]);
        let mut d = LineDecoder::new();
        let result = serve_connection(&mut t, &mut d, &timing(), |_| {
            panic!("no exchange expected")
        });
        assert_eq!(result, Ok(None));
        assert!(t.written.is_empty());
    }

    #[test]
    fn task_specs_are_named() {
        assert_eq!(task_spec(SecurityMode::NonSecure).display_name(), "tcp-io");
        assert_eq!(task_spec(SecurityMode::Secure).display_name(), "tls-io");
    }
}
