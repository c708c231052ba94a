//! Listener transport for the register protocol.
//!
//! Implements [`Transport`] over a single-client TCP server.  One
//! `ServerTransport` exists per listener; the secure one wraps each
//! accepted connection in TLS with mutual X.509 authentication.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: the plain listener uses `std::net` on
//!   lwIP; the secure listener uses raw lwIP sockets + ESP-IDF mbedTLS.
//! - **all other targets**: both listeners use `std::net` in plaintext,
//!   so the secure listener is a simulation for host-side testing.
//!
//! ## Connection model
//!
//! 1. `bind_plain()` / `bind_secure()` bind a non-blocking listener.
//! 2. `accept()` polls for an incoming connection and returns the peer
//!    address; the state becomes `Connected`.
//! 3. Reads are non-blocking: `read()` returns `Ok(0)` when no data is
//!    available, and `Err(PeerClosed)` once the peer has finished
//!    sending.  Writes keep working after `PeerClosed` so a client that
//!    half-closes still gets its response.
//! 4. `disconnect()` drains unread input, tears the connection down and
//!    returns to `Listening`.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

use log::{error, info, warn};

use crate::adapters::cert_store::{CertBundle, CertStoreError};
use crate::config::ServerConfig;
use crate::proto::transport::{SecurityMode, Transport, TransportError};

/// Upper bound on reads spent discarding input at disconnect.
const DRAIN_MAX_READS: usize = 16;

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Bound and listening for incoming connections.
    Listening,
    /// A client is connected (and, for TLS, the handshake is done).
    Connected,
    /// An unrecoverable error occurred on the current connection.
    Error,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF platform helpers (real lwIP + mbedTLS)
// ───────────────────────────────────────────────────────────────
#[cfg(target_os = "espidf")]
mod esp_impl;

/// Options for the secure listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecureOptions {
    /// Listen backlog.
    pub backlog: u8,
    /// Require a client certificate signed by the bundle's CA.
    pub verify_client: bool,
}

impl SecureOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            backlog: config.max_pending_connections,
            verify_client: config.require_client_cert,
        }
    }
}

enum Backend {
    Plain {
        listener: TcpListener,
        stream: Option<TcpStream>,
    },
    #[cfg(target_os = "espidf")]
    Tls {
        server: esp_impl::EspTlsServer,
        client: Option<esp_impl::EspTlsClient>,
    },
}

// ───────────────────────────────────────────────────────────────
// Listener pair
// ───────────────────────────────────────────────────────────────

/// Both listeners, as brought up at boot.
pub struct Listeners {
    pub plain: ServerTransport,
    /// `None` when the TLS identity or the secure bind failed.
    pub secure: Option<ServerTransport>,
}

impl Listeners {
    /// Bind the plain listener, then the secure one if `identity` is
    /// usable.  Only a plain bind failure is an error; the plain
    /// listener serves on without TLS otherwise.
    pub fn bind(
        config: &ServerConfig,
        identity: Result<CertBundle, CertStoreError>,
    ) -> Result<Self, TransportError> {
        let plain = ServerTransport::bind_plain(config.plain_port).map_err(|e| {
            error!("TCP listener on port {} failed: {}", config.plain_port, e);
            e
        })?;

        let secure = match identity {
            Ok(certs) => {
                let options = SecureOptions::from_config(config);
                match ServerTransport::bind_secure(config.secure_port, &certs, options) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        error!("TLS listener on port {} failed: {}", config.secure_port, e);
                        None
                    }
                }
            }
            Err(e) => {
                error!("TLS identity unavailable ({}); secure listener disabled", e);
                None
            }
        };
        Ok(Self { plain, secure })
    }
}

// ───────────────────────────────────────────────────────────────
// ServerTransport
// ───────────────────────────────────────────────────────────────

pub struct ServerTransport {
    mode: SecurityMode,
    state: ConnectionState,
    port: u16,
    /// The client has sent EOF / close_notify.
    read_closed: bool,
    backend: Backend,
}

impl ServerTransport {
    // ── Constructors ──────────────────────────────────────────

    /// Plain TCP listener on `0.0.0.0:<port>`.
    ///
    /// Pass port `0` to let the OS pick a free port (see
    /// [`local_port()`](Self::local_port)).
    pub fn bind_plain(port: u16) -> Result<Self, TransportError> {
        let listener = bind_std(port)?;
        let port = listener.local_addr().map_or(port, |a| a.port());
        info!("TCP: listening on port {}", port);
        Ok(Self::new_plain(SecurityMode::NonSecure, port, listener))
    }

    /// TLS listener on `0.0.0.0:<port>` using the server identity and
    /// client CA in `certs`.
    #[cfg(target_os = "espidf")]
    pub fn bind_secure(
        port: u16,
        certs: &CertBundle,
        options: SecureOptions,
    ) -> Result<Self, TransportError> {
        if !certs.is_complete() {
            warn!("TLS(espidf): incomplete certificate bundle");
            return Err(TransportError::Tls);
        }
        let server = esp_impl::esp_new(port, certs, options)?;
        Ok(Self {
            mode: SecurityMode::Secure,
            state: ConnectionState::Listening,
            port,
            read_closed: false,
            backend: Backend::Tls {
                server,
                client: None,
            },
        })
    }

    /// TLS listener, host simulation.
    ///
    /// The bundle is checked for completeness but TLS is not applied:
    /// connections are plaintext.
    #[cfg(not(target_os = "espidf"))]
    pub fn bind_secure(
        port: u16,
        certs: &CertBundle,
        options: SecureOptions,
    ) -> Result<Self, TransportError> {
        if !certs.is_complete() {
            warn!("TLS(sim): incomplete certificate bundle");
            return Err(TransportError::Tls);
        }
        let listener = bind_std(port)?;
        let port = listener.local_addr().map_or(port, |a| a.port());
        info!(
            "TLS(sim): listening on port {} (plaintext, verify_client={})",
            port, options.verify_client
        );
        Ok(Self::new_plain(SecurityMode::Secure, port, listener))
    }

    fn new_plain(mode: SecurityMode, port: u16, listener: TcpListener) -> Self {
        Self {
            mode,
            state: ConnectionState::Listening,
            port,
            read_closed: false,
            backend: Backend::Plain {
                listener,
                stream: None,
            },
        }
    }

    // ── Public API ────────────────────────────────────────────

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Port the listener is bound to.
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Poll for an incoming client connection (non-blocking).
    ///
    /// Returns the peer address if a client was accepted (and, for TLS,
    /// the handshake succeeded).  Returns `None` if no client is waiting
    /// or a client is already connected.
    pub fn accept(&mut self) -> Option<Ipv4Addr> {
        if self.state == ConnectionState::Connected {
            return None;
        }
        let peer = self.platform_accept()?;
        self.state = ConnectionState::Connected;
        self.read_closed = false;
        Some(peer)
    }

    /// Disconnect the current client and return to `Listening`.
    pub fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = ConnectionState::Listening;
        self.read_closed = false;
    }

    // ── Platform helpers ──────────────────────────────────────

    fn platform_accept(&mut self) -> Option<Ipv4Addr> {
        let tag = self.mode.tag();
        match &mut self.backend {
            Backend::Plain { listener, stream } => match listener.accept() {
                Ok((s, addr)) => {
                    if s.set_nonblocking(true).is_err() {
                        warn!("{}: failed to set non-blocking on client socket", tag);
                        return None;
                    }
                    *stream = Some(s);
                    Some(peer_ipv4(addr))
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
                Err(e) => {
                    warn!("{}: accept error: {}", tag, e);
                    None
                }
            },
            #[cfg(target_os = "espidf")]
            Backend::Tls { server, client } => {
                let (c, peer) = esp_impl::esp_accept(server)?;
                *client = Some(c);
                Some(peer)
            }
        }
    }

    fn platform_disconnect(&mut self) {
        match &mut self.backend {
            Backend::Plain { stream, .. } => {
                if let Some(mut s) = stream.take() {
                    // Unread input would turn the close into a reset and
                    // the peer could lose the response.
                    let mut sink = [0u8; 64];
                    let reads = if self.read_closed { 0 } else { DRAIN_MAX_READS };
                    for _ in 0..reads {
                        if !matches!(s.read(&mut sink), Ok(n) if n > 0) {
                            break;
                        }
                    }
                    let _ = s.shutdown(std::net::Shutdown::Write);
                }
            }
            #[cfg(target_os = "espidf")]
            Backend::Tls { client, .. } => {
                // EspTlsClient::drop() sends close_notify and closes the socket.
                client.take();
            }
        }
    }

    fn fail(&mut self, e: TransportError) -> TransportError {
        self.platform_disconnect();
        self.state = if e == TransportError::NotConnected {
            ConnectionState::Listening
        } else {
            ConnectionState::Error
        };
        e
    }
}

fn bind_std(port: u16) -> Result<TcpListener, TransportError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).map_err(|e| {
        warn!("bind to port {} failed: {}", port, e);
        TransportError::Bind
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|_| TransportError::Io)?;
    Ok(listener)
}

fn peer_ipv4(addr: SocketAddr) -> Ipv4Addr {
    match addr {
        SocketAddr::V4(v4) => *v4.ip(),
        SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}

// ───────────────────────────────────────────────────────────────
// Transport implementation
// ───────────────────────────────────────────────────────────────

impl Transport for ServerTransport {
    type Error = TransportError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        if self.read_closed {
            return Err(TransportError::PeerClosed);
        }
        let result = match &mut self.backend {
            Backend::Plain { stream, .. } => {
                let s = stream.as_mut().ok_or(TransportError::NotConnected)?;
                match s.read(buf) {
                    Ok(0) => Err(TransportError::PeerClosed),
                    Ok(n) => Ok(n),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                    Err(_) => Err(TransportError::Io),
                }
            }
            #[cfg(target_os = "espidf")]
            Backend::Tls { client, .. } => {
                let c = client.as_mut().ok_or(TransportError::NotConnected)?;
                esp_impl::esp_read(c, buf)
            }
        };
        match result {
            // Half-close: the stream stays open until disconnect().
            Err(TransportError::PeerClosed) => {
                self.read_closed = true;
                Err(TransportError::PeerClosed)
            }
            r => r.map_err(|e| self.fail(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let result = match &mut self.backend {
            Backend::Plain { stream, .. } => {
                let s = stream.as_mut().ok_or(TransportError::NotConnected)?;
                match s.write(data) {
                    Ok(n) => Ok(n),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                    Err(_) => Err(TransportError::Io),
                }
            }
            #[cfg(target_os = "espidf")]
            Backend::Tls { client, .. } => {
                let c = client.as_mut().ok_or(TransportError::NotConnected)?;
                esp_impl::esp_write(c, data)
            }
        };
        result.map_err(|e| self.fail(e))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        match &mut self.backend {
            Backend::Plain { stream, .. } => stream
                .as_mut()
                .ok_or(TransportError::NotConnected)?
                .flush()
                .map_err(|_| TransportError::Io),
            // mbedtls manages its own output buffering.
            #[cfg(target_os = "espidf")]
            Backend::Tls { .. } => Ok(()),
        }
    }

    fn available(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// ───────────────────────────────────────────────────────────────
// Tests (host / simulation path only)
// ───────────────────────────────────────────────────────────────
