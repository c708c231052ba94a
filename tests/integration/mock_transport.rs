//! Scripted transport for driving the connection handler without sockets.
//!
//! Each `read` pops one scripted step.  Once the script runs out the
//! client is either idle (reads return `Ok(0)`) or half-closed
//! (`PeerClosed`).  A failed read tears the connection down the way
//! `ServerTransport` does, so later writes fail too.

use std::collections::VecDeque;

use regserver::proto::transport::{Transport, TransportError};

#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    Idle,
    Fail(TransportError),
}

pub struct MockTransport {
    script: VecDeque<Step>,
    close_when_done: bool,
    torn_down: bool,
    pub written: Vec<u8>,
    pub flushes: usize,
}

#[allow(dead_code)]
impl MockTransport {
    /// A client that sends `chunks` and then goes quiet.
    pub fn sending(chunks: &[&str]) -> Self {
        Self {
            script: chunks.iter().map(|c| Step::Data(c.as_bytes().to_vec())).collect(),
            close_when_done: false,
            torn_down: false,
            written: Vec::new(),
            flushes: 0,
        }
    }

    pub fn scripted(steps: Vec<Step>) -> Self {
        Self {
            script: steps.into(),
            close_when_done: false,
            torn_down: false,
            written: Vec::new(),
            flushes: 0,
        }
    }

    /// Half-close (EOF) after the last scripted step.
    pub fn then_close(mut self) -> Self {
        self.close_when_done = true;
        self
    }

    /// Response text as sent, NUL padding stripped.
    pub fn response_text(&self) -> String {
        let end = self
            .written
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.written.len());
        String::from_utf8_lossy(&self.written[..end]).into_owned()
    }
}

impl Transport for MockTransport {
    type Error = TransportError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.script.pop_front() {
            Some(Step::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Step::Idle) => Ok(0),
            Some(Step::Fail(e)) => {
                self.torn_down = true;
                Err(e)
            }
            None if self.close_when_done => Err(TransportError::PeerClosed),
            None => Ok(0),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.torn_down {
            return Err(TransportError::NotConnected);
        }
        self.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.flushes += 1;
        Ok(())
    }

    fn available(&self) -> bool {
        !self.script.is_empty()
    }
}
