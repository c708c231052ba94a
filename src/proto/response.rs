//! Response lines and their fixed-size wire frame.
//!
//! Every request produces exactly one response.  On the wire the text is
//! sent as a 20-byte frame padded with NUL bytes; the longest response
//! text is 19 bytes, so a frame always carries at least one terminator.

use core::fmt::{self, Write as _};

use heapless::String;

use super::request::ProtocolError;
use crate::store::RegisterEntry;

/// Size of a response frame on the wire.
pub const RESPONSE_FRAME_LEN: usize = 20;

/// Response text, bounded by the frame size.
pub type ResponseText = String<RESPONSE_FRAME_LEN>;

/// Outcome of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Successful read or write; carries the stored entry.
    Ack(RegisterEntry),
    /// Read of a key that was never written.
    NotFound,
    /// Write of a new key into a full store.
    DatabaseFull { count: usize },
    /// Line failed validation.
    Rejected(ProtocolError),
}

impl Response {
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }

    /// Render the response text.
    pub fn text(&self) -> ResponseText {
        let mut text = ResponseText::new();
        // Every variant fits; an oversize count would only truncate.
        let _ = write!(text, "{self}");
        text
    }

    /// Render the NUL-padded wire frame.
    pub fn frame(&self) -> [u8; RESPONSE_FRAME_LEN] {
        let mut frame = [0u8; RESPONSE_FRAME_LEN];
        let text = self.text();
        let len = text.len().min(RESPONSE_FRAME_LEN - 1);
        frame[..len].copy_from_slice(&text.as_bytes()[..len]);
        frame
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack(e) => write!(f, "A{:04X}{:02X}{:04X}", e.device_id, e.reg_id, e.value),
            Self::NotFound => f.write_str("X Not Found"),
            Self::DatabaseFull { count } => write!(f, "X Database Full {count}"),
            Self::Rejected(reason) => write!(f, "X {reason}"),
        }
    }
}
