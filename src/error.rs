//! Unified error type for the register server firmware.
//!
//! Start-up paths funnel every subsystem error into [`Error`] so the entry
//! point handles them uniformly.  Request-level failures never get here:
//! they become `X …` response lines instead.

use core::fmt;

pub use crate::adapters::cert_store::CertStoreError;
pub use crate::adapters::wifi::ConnectivityError;
pub use crate::config::ConfigError;
pub use crate::proto::request::ProtocolError;
pub use crate::proto::transport::TransportError;
pub use crate::store::CapacityError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A listener could not be bound or its socket failed.
    Transport(TransportError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Network join failed.
    Comms(ConnectivityError),
    /// TLS identity could not be loaded.
    Certs(CertStoreError),
    /// Platform initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Certs(e) => write!(f, "certs: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Comms(e)
    }
}

impl From<CertStoreError> for Error {
    fn from(e: CertStoreError) -> Self {
        Self::Certs(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
