//! Register server firmware library.
//!
//! Exposes the protocol, store and service layers for integration
//! testing.  ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; every other path
//! runs on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod proto;
pub mod store;

mod esp_link_shims;
