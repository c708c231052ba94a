//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a subsystem against
//! mock adapters or a loopback socket.  All tests run on the host with
//! no device required.

mod listener_tests;
mod mock_sink;
mod mock_transport;
mod protocol_scenarios;
