//! ESP-IDF platform helpers for the secure listener.
//!
//! Compiled only for `target_os = "espidf"`: raw lwIP TCP sockets wrapped
//! in an mbedTLS server session with X.509 server identity and optional
//! client certificate verification.
//!
//! All items are `pub(super)` to keep them private to the adapter.

use std::net::Ipv4Addr;

use log::{info, warn};

use esp_idf_svc::sys::{
    AF_INET, EAGAIN, F_SETFL, MBEDTLS_ERR_SSL_PEER_CLOSE_NOTIFY, MBEDTLS_ERR_SSL_WANT_READ,
    MBEDTLS_ERR_SSL_WANT_WRITE, MBEDTLS_SSL_IS_SERVER, MBEDTLS_SSL_PRESET_DEFAULT,
    MBEDTLS_SSL_TRANSPORT_STREAM, MBEDTLS_SSL_VERIFY_NONE, MBEDTLS_SSL_VERIFY_REQUIRED,
    O_NONBLOCK, SOCK_STREAM, in_addr, lwip_accept, lwip_bind, lwip_close, lwip_fcntl, lwip_htons,
    lwip_listen, lwip_recv, lwip_send, lwip_socket, mbedtls_ctr_drbg_context,
    mbedtls_ctr_drbg_free, mbedtls_ctr_drbg_init, mbedtls_ctr_drbg_random, mbedtls_ctr_drbg_seed,
    mbedtls_entropy_context, mbedtls_entropy_free, mbedtls_entropy_func, mbedtls_entropy_init,
    mbedtls_pk_context, mbedtls_pk_free, mbedtls_pk_init, mbedtls_pk_parse_key,
    mbedtls_ssl_close_notify, mbedtls_ssl_conf_authmode, mbedtls_ssl_conf_ca_chain,
    mbedtls_ssl_conf_own_cert, mbedtls_ssl_conf_rng, mbedtls_ssl_config,
    mbedtls_ssl_config_defaults, mbedtls_ssl_config_free, mbedtls_ssl_config_init,
    mbedtls_ssl_context, mbedtls_ssl_free, mbedtls_ssl_handshake, mbedtls_ssl_init,
    mbedtls_ssl_read, mbedtls_ssl_set_bio, mbedtls_ssl_setup, mbedtls_ssl_write, mbedtls_x509_crt,
    mbedtls_x509_crt_free, mbedtls_x509_crt_init, mbedtls_x509_crt_parse, sockaddr, sockaddr_in,
    socklen_t, vTaskDelay,
};

use super::SecureOptions;
use crate::adapters::cert_store::CertBundle;
use crate::proto::transport::TransportError;

/// Maximum TLS handshake retries before giving up (non-blocking loop).
const HANDSHAKE_MAX_RETRIES: u32 = 200;

/// Personalisation string for the DRBG seed.
const DRBG_PERS: &[u8] = b"regserver-tls";

// ── BIO callbacks ─────────────────────────────────────────────────────────────
//
// mbedTLS calls these to move raw bytes over the client socket.  The socket
// fd is passed as the `p_bio` context pointer.

/// mbedTLS send BIO callback.
///
/// # Safety
///
/// `ctx` must be a socket fd cast to `*mut c_void`, valid for the lifetime
/// of the session (guaranteed by `EspTlsClient::fd`).
unsafe extern "C" fn bio_send(
    ctx: *mut core::ffi::c_void,
    buf: *const u8,
    len: usize,
) -> core::ffi::c_int {
    let fd = ctx as core::ffi::c_int;
    let ret =
        unsafe { lwip_send(fd, buf as *const core::ffi::c_void, len, 0) } as core::ffi::c_int;
    if ret < 0 {
        // SAFETY: __errno() points at the calling task's errno.
        let err = unsafe { *esp_idf_svc::sys::__errno() };
        if err == EAGAIN as i32 {
            return MBEDTLS_ERR_SSL_WANT_WRITE;
        }
    }
    ret
}

/// mbedTLS recv BIO callback.  EAGAIN maps to `MBEDTLS_ERR_SSL_WANT_READ`
/// so the non-blocking handshake and read paths can retry.
///
/// # Safety
///
/// Same invariants as `bio_send`.
unsafe extern "C" fn bio_recv(
    ctx: *mut core::ffi::c_void,
    buf: *mut u8,
    len: usize,
) -> core::ffi::c_int {
    let fd = ctx as core::ffi::c_int;
    let ret = unsafe { lwip_recv(fd, buf as *mut core::ffi::c_void, len, 0) } as core::ffi::c_int;
    if ret < 0 {
        // SAFETY: __errno() points at the calling task's errno.
        let err = unsafe { *esp_idf_svc::sys::__errno() };
        if err == EAGAIN as i32 {
            return MBEDTLS_ERR_SSL_WANT_READ;
        }
    }
    ret
}

// ── Session state ─────────────────────────────────────────────────────────────

/// Per-connection TLS state (heap-allocated to limit stack pressure).
pub(super) struct EspTlsClient {
    fd: core::ffi::c_int,
    ssl: Box<mbedtls_ssl_context>,
}

unsafe impl Send for EspTlsClient {}

impl Drop for EspTlsClient {
    fn drop(&mut self) {
        // SAFETY: `ssl` was set up in `esp_accept` and `fd` is an open socket;
        // both are released exactly once here.
        unsafe {
            mbedtls_ssl_close_notify(self.ssl.as_mut());
            mbedtls_ssl_free(self.ssl.as_mut());
            lwip_close(self.fd);
        }
    }
}

/// Parsed X.509 material referenced by the ssl config.
struct X509Context {
    server_cert: Box<mbedtls_x509_crt>,
    ca_cert: Box<mbedtls_x509_crt>,
    server_key: Box<mbedtls_pk_context>,
}

impl Drop for X509Context {
    fn drop(&mut self) {
        // SAFETY: initialised in `configure_x509`, freed exactly once.
        unsafe {
            mbedtls_x509_crt_free(self.server_cert.as_mut());
            mbedtls_x509_crt_free(self.ca_cert.as_mut());
            mbedtls_pk_free(self.server_key.as_mut());
        }
    }
}

// ── Server (listener + TLS config) ───────────────────────────────────────────

/// Long-lived TLS server context.
///
/// `conf` is freed in `drop` before the fields drop, so `x509` outlives
/// every reference mbedTLS holds to it.
pub(super) struct EspTlsServer {
    listener_fd: core::ffi::c_int,
    conf: Box<mbedtls_ssl_config>,
    entropy: Box<mbedtls_entropy_context>,
    drbg: Box<mbedtls_ctr_drbg_context>,
    // Only held so mbedTLS references stay valid.
    #[allow(dead_code)]
    x509: Option<X509Context>,
}

unsafe impl Send for EspTlsServer {}

impl Drop for EspTlsServer {
    fn drop(&mut self) {
        // SAFETY: all contexts were initialised in `esp_new` and are freed
        // exactly once.
        unsafe {
            mbedtls_ssl_config_free(self.conf.as_mut());
            mbedtls_ctr_drbg_free(self.drbg.as_mut());
            mbedtls_entropy_free(self.entropy.as_mut());
            lwip_close(self.listener_fd);
        }
    }
}

// ── Public helpers ────────────────────────────────────────────────────────────

/// Bind a non-blocking TCP listener on `port`.
fn bind_listener(port: u16, backlog: u8) -> Result<core::ffi::c_int, TransportError> {
    // SAFETY: lwIP socket call with valid domain/type/protocol.
    let fd = unsafe { lwip_socket(AF_INET as _, SOCK_STREAM as _, 0) };
    if fd < 0 {
        warn!("TLS(espidf): lwip_socket failed ({})", fd);
        return Err(TransportError::Io);
    }

    let addr = sockaddr_in {
        sin_len: 0,
        sin_family: AF_INET as _,
        // SAFETY: lwip_htons is a pure byte-order conversion.
        sin_port: unsafe { lwip_htons(port) },
        sin_addr: in_addr { s_addr: 0 }, // INADDR_ANY
        sin_zero: [0u8; 8],
    };

    // SAFETY: `addr` is valid for the duration of the call.
    let rc = unsafe {
        lwip_bind(
            fd,
            core::ptr::addr_of!(addr).cast(),
            core::mem::size_of::<sockaddr_in>() as _,
        )
    };
    if rc < 0 {
        unsafe { lwip_close(fd) };
        warn!("TLS(espidf): lwip_bind({}) failed ({})", port, rc);
        return Err(TransportError::Bind);
    }

    // SAFETY: fd is a bound stream socket.
    let rc = unsafe { lwip_listen(fd, i32::from(backlog)) };
    if rc < 0 {
        unsafe { lwip_close(fd) };
        warn!("TLS(espidf): lwip_listen failed ({})", rc);
        return Err(TransportError::Io);
    }

    // SAFETY: F_SETFL + O_NONBLOCK is a valid fcntl for sockets.
    let rc = unsafe { lwip_fcntl(fd, F_SETFL as _, O_NONBLOCK as _) };
    if rc < 0 {
        unsafe { lwip_close(fd) };
        warn!("TLS(espidf): O_NONBLOCK failed ({})", rc);
        return Err(TransportError::Io);
    }
    Ok(fd)
}

/// Parse the bundle and attach it to `conf`.
///
/// # Safety
///
/// `conf` must be a valid, initialised `mbedtls_ssl_config`.  The returned
/// context must outlive every session created from `conf`.
unsafe fn configure_x509(
    conf: &mut mbedtls_ssl_config,
    certs: &CertBundle,
    verify_client: bool,
) -> Result<X509Context, TransportError> {
    let mut x509 = X509Context {
        server_cert: Box::new(mbedtls_x509_crt::default()),
        ca_cert: Box::new(mbedtls_x509_crt::default()),
        server_key: Box::new(mbedtls_pk_context::default()),
    };

    // SAFETY: all pointers come from owned boxes; PEM inputs are
    // NUL-terminated by `CertBundle`.  On early return `x509` drops and
    // frees whatever was parsed.
    unsafe {
        mbedtls_x509_crt_init(x509.server_cert.as_mut());
        mbedtls_x509_crt_init(x509.ca_cert.as_mut());
        mbedtls_pk_init(x509.server_key.as_mut());

        let rc = mbedtls_x509_crt_parse(
            x509.server_cert.as_mut(),
            certs.server_cert.as_ptr(),
            certs.server_cert.len(),
        );
        if rc != 0 {
            warn!("TLS(espidf): x509_crt_parse(server) failed (rc={})", rc);
            return Err(TransportError::Tls);
        }

        let rc = mbedtls_x509_crt_parse(
            x509.ca_cert.as_mut(),
            certs.ca_cert.as_ptr(),
            certs.ca_cert.len(),
        );
        if rc != 0 {
            warn!("TLS(espidf): x509_crt_parse(ca) failed (rc={})", rc);
            return Err(TransportError::Tls);
        }

        let rc = mbedtls_pk_parse_key(
            x509.server_key.as_mut(),
            certs.server_key.as_ptr(),
            certs.server_key.len(),
            core::ptr::null(),
            0,
            None,
            core::ptr::null_mut(),
        );
        if rc != 0 {
            warn!("TLS(espidf): pk_parse_key failed (rc={})", rc);
            return Err(TransportError::Tls);
        }

        let rc = mbedtls_ssl_conf_own_cert(
            conf,
            x509.server_cert.as_mut(),
            x509.server_key.as_mut(),
        );
        if rc != 0 {
            warn!("TLS(espidf): ssl_conf_own_cert failed (rc={})", rc);
            return Err(TransportError::Tls);
        }

        mbedtls_ssl_conf_ca_chain(conf, x509.ca_cert.as_mut(), core::ptr::null_mut());
        let authmode = if verify_client {
            MBEDTLS_SSL_VERIFY_REQUIRED
        } else {
            MBEDTLS_SSL_VERIFY_NONE
        };
        mbedtls_ssl_conf_authmode(conf, authmode as _);
    }

    info!(
        "TLS(espidf): X.509 identity configured (client verification {})",
        if verify_client { "required" } else { "off" }
    );
    Ok(x509)
}

/// Bind the listener and build the mbedTLS server config.
pub(super) fn esp_new(
    port: u16,
    certs: &CertBundle,
    options: SecureOptions,
) -> Result<EspTlsServer, TransportError> {
    let listener_fd = bind_listener(port, options.backlog)?;

    // The server owns the fd from here on; its Drop closes it on every
    // error path below.
    let mut server = EspTlsServer {
        listener_fd,
        conf: Box::new(mbedtls_ssl_config::default()),
        entropy: Box::new(mbedtls_entropy_context::default()),
        drbg: Box::new(mbedtls_ctr_drbg_context::default()),
        x509: None,
    };

    // SAFETY: pointers come from owned boxes and stay valid for the server's
    // lifetime; call order follows the mbedTLS API contract.
    unsafe {
        mbedtls_entropy_init(server.entropy.as_mut());
        mbedtls_ctr_drbg_init(server.drbg.as_mut());
        mbedtls_ssl_config_init(server.conf.as_mut());

        let rc = mbedtls_ctr_drbg_seed(
            server.drbg.as_mut(),
            Some(mbedtls_entropy_func),
            server.entropy.as_mut() as *mut _ as *mut core::ffi::c_void,
            DRBG_PERS.as_ptr(),
            DRBG_PERS.len(),
        );
        if rc != 0 {
            warn!("TLS(espidf): ctr_drbg_seed failed (rc={})", rc);
            return Err(TransportError::Tls);
        }

        let rc = mbedtls_ssl_config_defaults(
            server.conf.as_mut(),
            MBEDTLS_SSL_IS_SERVER as _,
            MBEDTLS_SSL_TRANSPORT_STREAM as _,
            MBEDTLS_SSL_PRESET_DEFAULT as _,
        );
        if rc != 0 {
            warn!("TLS(espidf): ssl_config_defaults failed (rc={})", rc);
            return Err(TransportError::Tls);
        }

        mbedtls_ssl_conf_rng(
            server.conf.as_mut(),
            Some(mbedtls_ctr_drbg_random),
            server.drbg.as_mut() as *mut _ as *mut core::ffi::c_void,
        );

        server.x509 = Some(configure_x509(
            server.conf.as_mut(),
            certs,
            options.verify_client,
        )?);
    }

    info!(
        "TLS(espidf): listening on port {} (backlog={})",
        port, options.backlog
    );
    Ok(server)
}

/// Non-blocking accept followed by the TLS handshake.
///
/// Returns the session and the peer address; `None` if no client is
/// waiting or the handshake fails (including a rejected client
/// certificate).
pub(super) fn esp_accept(server: &EspTlsServer) -> Option<(EspTlsClient, Ipv4Addr)> {
    let mut addr = sockaddr_in::default();
    let mut addr_len = core::mem::size_of::<sockaddr_in>() as socklen_t;

    // SAFETY: listener_fd is a valid non-blocking socket; addr/addr_len are
    // valid for writes of the declared size.
    let client_fd = unsafe {
        lwip_accept(
            server.listener_fd,
            core::ptr::addr_of_mut!(addr).cast::<sockaddr>(),
            &mut addr_len,
        )
    };
    if client_fd < 0 {
        return None; // EAGAIN: no client waiting
    }
    let peer = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));

    // SAFETY: F_SETFL is valid on a connected socket.
    let rc = unsafe { lwip_fcntl(client_fd, F_SETFL as _, O_NONBLOCK as _) };
    if rc < 0 {
        unsafe { lwip_close(client_fd) };
        warn!("TLS(espidf): O_NONBLOCK on client {} failed ({})", peer, rc);
        return None;
    }

    let mut ssl = Box::new(mbedtls_ssl_context::default());

    // SAFETY: ssl is freshly allocated; server.conf outlives the session
    // because the listener task owns the server for its whole life.
    unsafe {
        mbedtls_ssl_init(ssl.as_mut());

        let rc = mbedtls_ssl_setup(ssl.as_mut(), server.conf.as_ref());
        if rc != 0 {
            mbedtls_ssl_free(ssl.as_mut());
            lwip_close(client_fd);
            warn!("TLS(espidf): ssl_setup failed (rc={})", rc);
            return None;
        }

        mbedtls_ssl_set_bio(
            ssl.as_mut(),
            client_fd as usize as *mut core::ffi::c_void,
            Some(bio_send),
            Some(bio_recv),
            None,
        );
    }

    // From here the session owns both the ssl context and the socket.
    let mut client = EspTlsClient { fd: client_fd, ssl };

    let mut retries = 0u32;
    loop {
        // SAFETY: ssl is set up with BIO callbacks attached.
        let rc = unsafe { mbedtls_ssl_handshake(client.ssl.as_mut()) };
        if rc == 0 {
            break;
        }
        if rc == MBEDTLS_ERR_SSL_WANT_READ || rc == MBEDTLS_ERR_SSL_WANT_WRITE {
            retries += 1;
            if retries >= HANDSHAKE_MAX_RETRIES {
                warn!("TLS(espidf): handshake with {} timed out", peer);
                return None;
            }
            // Yield one FreeRTOS tick so lwIP can deliver in-flight data.
            // SAFETY: vTaskDelay may be called from any task context.
            unsafe { vTaskDelay(1) };
            continue;
        }
        // Bad client certificate, protocol error, ...
        warn!("TLS(espidf): handshake with {} failed (rc={})", peer, rc);
        return None;
    }

    info!("TLS(espidf): handshake complete with {} (fd={})", peer, client.fd);
    Some((client, peer))
}

/// Non-blocking read.  `Ok(0)` means no data yet.
pub(super) fn esp_read(
    client: &mut EspTlsClient,
    buf: &mut [u8],
) -> Result<usize, TransportError> {
    // SAFETY: ssl is an established session; buf is a valid mutable slice.
    let rc = unsafe { mbedtls_ssl_read(client.ssl.as_mut(), buf.as_mut_ptr(), buf.len()) };

    if rc > 0 {
        return Ok(rc as usize);
    }
    if rc == MBEDTLS_ERR_SSL_WANT_READ || rc == MBEDTLS_ERR_SSL_WANT_WRITE {
        return Ok(0);
    }
    if rc == MBEDTLS_ERR_SSL_PEER_CLOSE_NOTIFY || rc == 0 {
        return Err(TransportError::PeerClosed);
    }
    warn!("TLS(espidf): ssl_read error (rc={})", rc);
    Err(TransportError::Tls)
}

/// Non-blocking write.  `Ok(0)` means retry later.
pub(super) fn esp_write(
    client: &mut EspTlsClient,
    data: &[u8],
) -> Result<usize, TransportError> {
    // SAFETY: ssl is an established session; data is a valid slice.
    let rc = unsafe { mbedtls_ssl_write(client.ssl.as_mut(), data.as_ptr(), data.len()) };

    if rc > 0 {
        return Ok(rc as usize);
    }
    if rc == MBEDTLS_ERR_SSL_WANT_WRITE || rc == MBEDTLS_ERR_SSL_WANT_READ {
        return Ok(0);
    }
    warn!("TLS(espidf): ssl_write error (rc={})", rc);
    Err(TransportError::Tls)
}
