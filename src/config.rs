//! Server configuration parameters
//!
//! All tunable parameters for the register server.  Defaults match the
//! deployed firmware; a JSON override can be baked in at build time via
//! `REGSERVER_CONFIG_JSON`.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::{DEFAULT_CAPACITY, MAX_CAPACITY};

/// Core server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // --- Listeners ---
    /// Plain TCP listener port
    pub plain_port: u16,
    /// TLS listener port
    pub secure_port: u16,
    /// Listen backlog for pending connections
    pub max_pending_connections: u8,
    /// Require and verify a client certificate on the TLS listener
    pub require_client_cert: bool,

    // --- Store ---
    /// Maximum number of distinct register keys
    pub store_capacity: usize,

    // --- Timing ---
    /// Receive timeout per connection (milliseconds)
    pub recv_timeout_ms: u32,
    /// Accept poll interval (milliseconds)
    pub accept_poll_ms: u32,
    /// Read poll interval while waiting for a line (milliseconds)
    pub read_poll_ms: u32,
    /// Statistics report interval (seconds)
    pub stats_interval_secs: u32,

    // --- WiFi ---
    /// Join retries after the first attempt
    pub wifi_max_retries: u32,
    /// Delay between join attempts (milliseconds)
    pub wifi_retry_interval_ms: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // Listeners
            plain_port: 27708,
            secure_port: 40508,
            max_pending_connections: 3,
            require_client_cert: true,

            // Store
            store_capacity: DEFAULT_CAPACITY,

            // Timing
            recv_timeout_ms: 2000,
            accept_poll_ms: 50,
            read_poll_ms: 1,
            stats_interval_secs: 60, // 1/min

            // WiFi
            wifi_max_retries: 10,
            wifi_retry_interval_ms: 1000,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON override and validate it.  Missing fields keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|_| ConfigError::DeserializationFailed)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration baked in at build time, or the defaults.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        match option_env!("REGSERVER_CONFIG_JSON") {
            Some(json) => Self::from_json(json),
            None => Ok(Self::default()),
        }
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plain_port == 0 || self.secure_port == 0 {
            return Err(ConfigError::ValidationFailed("ports must be non-zero"));
        }
        if self.plain_port == self.secure_port {
            return Err(ConfigError::ValidationFailed("ports must differ"));
        }
        if !(1..=MAX_CAPACITY).contains(&self.store_capacity) {
            return Err(ConfigError::ValidationFailed("store_capacity out of range"));
        }
        if self.max_pending_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_pending_connections must be non-zero",
            ));
        }
        if self.recv_timeout_ms == 0 || self.accept_poll_ms == 0 || self.read_poll_ms == 0 {
            return Err(ConfigError::ValidationFailed("intervals must be non-zero"));
        }
        if self.read_poll_ms > self.recv_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "read_poll_ms exceeds recv_timeout_ms",
            ));
        }
        if !(1..=3600).contains(&self.stats_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "stats_interval_secs out of range",
            ));
        }
        Ok(())
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.recv_timeout_ms))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.stats_interval_secs))
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// JSON was malformed or had wrongly typed fields.
    DeserializationFailed,
    /// A value was out of range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeserializationFailed => write!(f, "config deserialization failed"),
            Self::ValidationFailed(why) => write!(f, "config validation failed: {why}"),
        }
    }
}
