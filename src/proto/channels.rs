//! Request bus between listener tasks and the dispatcher.
//!
//! Uses `embassy-sync` bounded channels so the listener threads never
//! touch the register store directly.  The dispatcher owns the
//! [`RegisterService`] and answers requests one at a time.
//!
//! ```text
//! ┌──────────────┐  RequestMsg   ┌──────────────┐
//! │ tcp listener │──────┐        │              │
//! └──────────────┘      ├──────▶│  Dispatcher  │
//! ┌──────────────┐      │        │  (service)   │
//! │ tls listener │──────┘        │              │
//! └──────────────┘◀──────────────└──────────────┘
//!                ResponseMsg (one channel per origin)
//! ```
//!
//! Each listener serves one client at a time, so at most one request per
//! origin is in flight and a per-origin response channel of depth one is
//! enough.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::app::service::RegisterService;
use crate::store::RegisterMap;

use super::codec::Line;
use super::response::Response;
use super::transport::SecurityMode;

/// Inbound request line from a listener.
pub struct RequestMsg {
    /// Listener the line arrived on; selects the response channel.
    pub origin: SecurityMode,
    pub line: Line,
}

/// Outbound response for a listener.
pub struct ResponseMsg {
    pub response: Response,
}

/// Channel depth for inbound requests.
const REQ_DEPTH: usize = 4;

/// Channel depth for each response channel.
const RESP_DEPTH: usize = 1;

type ResponseChannel = Channel<CriticalSectionRawMutex, ResponseMsg, RESP_DEPTH>;

pub struct RequestBus {
    requests: Channel<CriticalSectionRawMutex, RequestMsg, REQ_DEPTH>,
    responses: [ResponseChannel; SecurityMode::COUNT],
}

impl RequestBus {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            responses: [Channel::new(), Channel::new()],
        }
    }

    /// Listener side: submit a line and wait for its response.
    pub async fn exchange(&self, origin: SecurityMode, line: Line) -> Response {
        self.requests.send(RequestMsg { origin, line }).await;
        self.responses[origin.index()].receive().await.response
    }

    /// Dispatcher side: wait for one request, answer it, and return the
    /// origin it was answered to.
    pub async fn serve_one<M: RegisterMap>(
        &self,
        service: &mut RegisterService<M>,
    ) -> SecurityMode {
        let msg = self.requests.receive().await;
        let response = service.handle_line(&msg.line);
        self.responses[msg.origin.index()]
            .send(ResponseMsg { response })
            .await;
        msg.origin
    }

    /// Number of requests waiting for the dispatcher.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}

impl Default for RequestBus {
    fn default() -> Self {
        Self::new()
    }
}
