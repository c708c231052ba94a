//! Request line framing.
//!
//! Clients send one request per connection, either as a bare line or as
//! a fixed 20-byte NUL-padded packet.  The decoder accumulates incoming
//! bytes and yields a line at the first of:
//!
//! ```text
//! NUL            "R00AA01\0\0\0…"   -> "R00AA01"
//! LF (CR drop)   "R00AA01\r\n"      -> "R00AA01"
//! full frame     20 bytes, no term  -> all 20 bytes
//! timeout        "R00AA01" + idle   -> take_pending()
//! ```
//!
//! A single `Transport::read` may deliver the line in pieces; bytes after
//! the terminator in the same chunk are discarded.

use heapless::Vec;

/// Size of one receive frame.
pub const LINE_FRAME_LEN: usize = 20;

/// One framed request line, terminator stripped.
pub type Line = Vec<u8, LINE_FRAME_LEN>;

/// Streaming line decoder.
pub struct LineDecoder {
    buf: Line,
}

impl LineDecoder {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed bytes into the decoder.
    ///
    /// Returns `Some(line)` once a line is complete; the decoder is then
    /// empty again.
    pub fn feed(&mut self, data: &[u8]) -> Option<Line> {
        for &byte in data {
            match byte {
                0 => return Some(self.take()),
                b'\n' => {
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                    return Some(self.take());
                }
                _ => {
                    // Cannot fail: a full buffer is flushed below.
                    let _ = self.buf.push(byte);
                    if self.buf.is_full() {
                        return Some(self.take());
                    }
                }
            }
        }
        None
    }

    /// Flush bytes received without a terminator (receive timeout or EOF).
    ///
    /// Returns `None` if nothing is pending.
    pub fn take_pending(&mut self) -> Option<Line> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial line (e.g. when a new client connects).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn take(&mut self) -> Line {
        core::mem::take(&mut self.buf)
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
