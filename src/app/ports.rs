//! Port traits: the boundary between the register service and the
//! outside world.
//!
//! ```text
//!   RegisterService ──▶ EventSink ──▶ adapter (serial log, ...)
//! ```
//!
//! The transport side of the boundary is
//! [`Transport`](crate::proto::transport::Transport).

use super::events::AppEvent;

/// Structured [`AppEvent`]s leave the core through this port.  Adapters
/// decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}
