//! Certificate store: TLS identity for the secure listener.
//!
//! On ESP-IDF targets the material lives as blobs in the `certs` NVS
//! namespace.  On simulation targets an in-memory table stands in for
//! NVS so provisioning and loading can be exercised in tests.
//!
//! | Key           | Content                                   |
//! |---------------|-------------------------------------------|
//! | `server_cert` | PEM-encoded server certificate            |
//! | `server_key`  | PEM-encoded server private key            |
//! | `ca_cert`     | PEM-encoded root CA for client validation |
//!
//! A factory identity can be baked into the image at build time by
//! pointing `REGSERVER_SERVER_CERT`, `REGSERVER_SERVER_KEY` and
//! `REGSERVER_CA_CERT` at PEM files.  It is used, and written to NVS,
//! only while the namespace is unprovisioned.

use core::fmt;

use log::{info, warn};

/// NVS namespace holding the TLS identity.
pub const CERT_NAMESPACE: &str = "certs";

pub const KEY_SERVER_CERT: &str = "server_cert";
pub const KEY_SERVER_KEY: &str = "server_key";
pub const KEY_CA_CERT: &str = "ca_cert";

/// Maximum certificate size (PEM, headers and terminator included).
pub const MAX_CERT_SIZE: usize = 4096;

/// Maximum private key size.
pub const MAX_KEY_SIZE: usize = 2048;

const EMBEDDED_CERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/server_cert.pem"));
const EMBEDDED_KEY: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/server_key.pem"));
const EMBEDDED_CA: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/ca_cert.pem"));

// ───────────────────────────────────────────────────────────────
// CertBundle
// ───────────────────────────────────────────────────────────────

/// Server identity plus the CA that client certificates must chain to.
///
/// Every component is NUL-terminated, as mbedTLS requires for PEM input.
pub struct CertBundle {
    pub server_cert: heapless::Vec<u8, MAX_CERT_SIZE>,
    pub server_key: heapless::Vec<u8, MAX_KEY_SIZE>,
    pub ca_cert: heapless::Vec<u8, MAX_CERT_SIZE>,
}

impl CertBundle {
    /// Build a bundle from PEM text, appending terminators where missing.
    pub fn from_pem(
        server_cert: &[u8],
        server_key: &[u8],
        ca_cert: &[u8],
    ) -> Result<Self, CertStoreError> {
        Ok(Self {
            server_cert: pem_component(KEY_SERVER_CERT, server_cert)?,
            server_key: pem_component(KEY_SERVER_KEY, server_key)?,
            ca_cert: pem_component(KEY_CA_CERT, ca_cert)?,
        })
    }

    /// The identity embedded at build time, if any.
    ///
    /// A partially embedded identity is an error.
    pub fn embedded() -> Result<Option<Self>, CertStoreError> {
        if EMBEDDED_CERT.is_empty() && EMBEDDED_KEY.is_empty() && EMBEDDED_CA.is_empty() {
            return Ok(None);
        }
        Self::from_pem(EMBEDDED_CERT, EMBEDDED_KEY, EMBEDDED_CA).map(Some)
    }

    pub fn is_complete(&self) -> bool {
        [&self.server_cert[..], &self.server_key[..], &self.ca_cert[..]]
            .iter()
            .all(|c| c.len() > 1)
    }
}

fn pem_component<const N: usize>(
    name: &'static str,
    pem: &[u8],
) -> Result<heapless::Vec<u8, N>, CertStoreError> {
    let body = pem.strip_suffix(&[0]).unwrap_or(pem);
    if body.is_empty() {
        return Err(CertStoreError::Missing(name));
    }
    let mut out = heapless::Vec::new();
    if out.extend_from_slice(body).is_err() || out.push(0).is_err() {
        return Err(CertStoreError::TooLarge(name));
    }
    Ok(out)
}

// ───────────────────────────────────────────────────────────────
// CertStore
// ───────────────────────────────────────────────────────────────

pub struct CertStore {
    #[cfg(target_os = "espidf")]
    nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,

    #[cfg(not(target_os = "espidf"))]
    blobs: std::collections::HashMap<&'static str, Vec<u8>>,
}

impl CertStore {
    #[cfg(target_os = "espidf")]
    pub fn new(nvs: esp_idf_svc::nvs::EspDefaultNvsPartition) -> Self {
        Self { nvs }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            blobs: std::collections::HashMap::new(),
        }
    }

    /// Load the full bundle.  Fails if any component is absent.
    pub fn load_bundle(&self) -> Result<CertBundle, CertStoreError> {
        let mut cert = [0u8; MAX_CERT_SIZE];
        let mut key = [0u8; MAX_KEY_SIZE];
        let mut ca = [0u8; MAX_CERT_SIZE];

        let cert = self.platform_read(KEY_SERVER_CERT, &mut cert)?;
        let key = self.platform_read(KEY_SERVER_KEY, &mut key)?;
        let ca = self.platform_read(KEY_CA_CERT, &mut ca)?;

        let bundle = CertBundle::from_pem(cert, key, ca)?;
        info!(
            "CertStore: loaded bundle (cert={}B, key={}B, ca={}B)",
            bundle.server_cert.len(),
            bundle.server_key.len(),
            bundle.ca_cert.len(),
        );
        Ok(bundle)
    }

    /// Load the bundle from NVS, falling back to `fallback` when NVS has
    /// none.  The fallback is persisted so later boots find it in NVS;
    /// a failed write is logged and does not stop the fallback being used.
    pub fn load_or_seed(
        &mut self,
        fallback: Option<CertBundle>,
    ) -> Result<CertBundle, CertStoreError> {
        let err = match self.load_bundle() {
            Ok(bundle) => return Ok(bundle),
            Err(e) => e,
        };
        let Some(bundle) = fallback else {
            return Err(err);
        };
        info!("CertStore: {}, seeding from firmware image", err);
        if let Err(e) = self.seed(&bundle) {
            warn!("CertStore: seeding failed: {}", e);
        }
        Ok(bundle)
    }

    /// Boot-time identity: NVS first, then the embedded factory bundle.
    pub fn load_identity(&mut self) -> Result<CertBundle, CertStoreError> {
        let fallback = CertBundle::embedded().unwrap_or_else(|e| {
            warn!("CertStore: embedded identity unusable: {}", e);
            None
        });
        self.load_or_seed(fallback)
    }

    fn seed(&mut self, bundle: &CertBundle) -> Result<(), CertStoreError> {
        self.store_cert(KEY_SERVER_CERT, &bundle.server_cert)?;
        self.store_cert(KEY_SERVER_KEY, &bundle.server_key)?;
        self.store_cert(KEY_CA_CERT, &bundle.ca_cert)
    }

    /// Store one component (provisioning).
    pub fn store_cert(&mut self, key: &'static str, data: &[u8]) -> Result<(), CertStoreError> {
        let limit = if key == KEY_SERVER_KEY {
            MAX_KEY_SIZE
        } else {
            MAX_CERT_SIZE
        };
        if data.len() > limit {
            warn!("CertStore: '{}' too large ({}B > {}B)", key, data.len(), limit);
            return Err(CertStoreError::TooLarge(key));
        }
        self.platform_write(key, data)?;
        info!("CertStore: stored '{}' ({}B)", key, data.len());
        Ok(())
    }

    // ── Platform-specific access ─────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_read<'a>(
        &self,
        key: &'static str,
        buf: &'a mut [u8],
    ) -> Result<&'a [u8], CertStoreError> {
        use esp_idf_svc::nvs::EspDefaultNvs;

        let nvs = EspDefaultNvs::new(self.nvs.clone(), CERT_NAMESPACE, false)
            .map_err(|_| CertStoreError::NvsError)?;
        match nvs.get_blob(key, buf) {
            Ok(Some(blob)) => Ok(blob),
            Ok(None) => Err(CertStoreError::Missing(key)),
            Err(_) => Err(CertStoreError::NvsError),
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_write(&mut self, key: &'static str, data: &[u8]) -> Result<(), CertStoreError> {
        use esp_idf_svc::nvs::EspDefaultNvs;

        let mut nvs = EspDefaultNvs::new(self.nvs.clone(), CERT_NAMESPACE, true)
            .map_err(|_| CertStoreError::NvsError)?;
        nvs.set_blob(key, data)
            .map_err(|_| CertStoreError::WriteFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read<'a>(
        &self,
        key: &'static str,
        buf: &'a mut [u8],
    ) -> Result<&'a [u8], CertStoreError> {
        let blob = self.blobs.get(key).ok_or(CertStoreError::Missing(key))?;
        let dst = buf
            .get_mut(..blob.len())
            .ok_or(CertStoreError::TooLarge(key))?;
        dst.copy_from_slice(blob);
        Ok(dst)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_write(&mut self, key: &'static str, data: &[u8]) -> Result<(), CertStoreError> {
        self.blobs.insert(key, data.to_vec());
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for CertStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from the certificate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStoreError {
    NvsError,
    WriteFailed,
    /// A component was never provisioned.
    Missing(&'static str),
    /// A component does not fit its buffer.
    TooLarge(&'static str),
}

impl fmt::Display for CertStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NvsError => write!(f, "NVS access error"),
            Self::WriteFailed => write!(f, "cert write failed"),
            Self::Missing(key) => write!(f, "'{key}' not provisioned"),
            Self::TooLarge(key) => write!(f, "'{key}' exceeds maximum size"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
