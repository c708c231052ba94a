//! Application core: request dispatch against the register store.
//!
//! Nothing in this layer performs I/O.  Outbound events flow through the
//! [`ports::EventSink`] port, requests arrive as already-framed lines.

pub mod events;
pub mod ports;
pub mod service;
