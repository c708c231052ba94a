//! Outbound application events.
//!
//! The service and the listener tasks emit these through the
//! [`EventSink`](super::ports::EventSink) port.

use core::fmt;
use std::net::Ipv4Addr;

use crate::proto::codec::Line;
use crate::proto::response::{Response, ResponseText};
use crate::proto::transport::SecurityMode;

use super::service::ServiceStats;

/// Structured events emitted by the application.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The service is ready to handle requests.
    Started { capacity: usize },

    /// A listener is bound and accepting connections.
    ListenerStarted { mode: SecurityMode, port: u16 },

    /// One request/response exchange finished.
    Exchange(ConnectionRecord),

    /// A client connected but sent nothing before the receive timeout.
    ReceiveTimeout { mode: SecurityMode, peer: Ipv4Addr },

    /// Periodic counters.
    Stats {
        stats: ServiceStats,
        entries: usize,
        capacity: usize,
    },
}

/// What the client sent, as it appears in the connection log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSummary {
    /// The request line of an accepted request.
    Text(Line),
    /// Only the length of a rejected line.
    Length(usize),
}

impl fmt::Display for MessageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(line) => line
                .iter()
                .try_for_each(|&b| fmt::Write::write_char(f, char::from(b))),
            Self::Length(n) => write!(f, "Length: {n}"),
        }
    }
}

/// Diagnostic record of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub peer: Ipv4Addr,
    pub mode: SecurityMode,
    pub message: MessageSummary,
    pub response: ResponseText,
}

impl ConnectionRecord {
    pub fn new(peer: Ipv4Addr, mode: SecurityMode, line: &[u8], response: &Response) -> Self {
        let message = match response {
            Response::Rejected(_) => MessageSummary::Length(line.len()),
            _ => MessageSummary::Text(Line::from_slice(line).unwrap_or_default()),
        };
        Self {
            peer,
            mode,
            message,
            response: response.text(),
        }
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection from IP: {}\tConnection: {}\tMessage: {}\tResponse: {}",
            self.peer, self.mode, self.message, self.response
        )
    }
}
