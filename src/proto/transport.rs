//! Transport abstraction for one accepted client connection.
//!
//! The listener loop is generic over `Transport`, so the same connection
//! handling runs over plain TCP, TLS, and in-memory test doubles.

use core::fmt;

/// Byte-oriented, non-blocking client channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data is available yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`, returning the number of bytes accepted.
    /// Returns 0 if the output buffer is momentarily full.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Whether a client is attached.
    fn available(&self) -> bool;
}

/// Errors from a listener transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// TCP or socket I/O failure.
    Io,
    /// TLS identity, handshake or session error.
    Tls,
    /// Operation requires a connected client but none is present.
    NotConnected,
    /// The client finished sending (EOF or TLS close_notify).  The
    /// connection stays open for the response.
    PeerClosed,
    /// The listening socket could not be bound.
    Bind,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "TCP/socket I/O error"),
            Self::Tls => write!(f, "TLS handshake or session error"),
            Self::NotConnected => write!(f, "no client connected"),
            Self::PeerClosed => write!(f, "client closed its sending side"),
            Self::Bind => write!(f, "could not bind listening socket"),
        }
    }
}

/// Which listener a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    /// Plain TCP.
    NonSecure,
    /// TLS with client certificate verification.
    Secure,
}

impl SecurityMode {
    /// Number of listener kinds.
    pub const COUNT: usize = 2;

    pub const ALL: [Self; Self::COUNT] = [Self::NonSecure, Self::Secure];

    /// Dense index for per-mode tables.
    pub const fn index(self) -> usize {
        match self {
            Self::NonSecure => 0,
            Self::Secure => 1,
        }
    }

    /// Label used in connection logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NonSecure => "Non-Secure",
            Self::Secure => "Secure",
        }
    }

    /// Short lowercase tag for log prefixes.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::NonSecure => "tcp",
            Self::Secure => "tls",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense() {
        for (i, mode) in SecurityMode::ALL.iter().enumerate() {
            assert_eq!(mode.index(), i);
        }
    }

    #[test]
    fn labels() {
        assert_eq!(SecurityMode::Secure.to_string(), "Secure");
        assert_eq!(SecurityMode::NonSecure.to_string(), "Non-Secure");
    }
}
