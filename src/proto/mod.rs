//! Register protocol: request parsing, response framing, line
//! reassembly, and the listener tasks that move lines between sockets
//! and the dispatcher.

pub mod channels;
pub mod codec;
pub mod io_task;
pub mod request;
pub mod response;
pub mod transport;
