//! WiFi station-mode join.
//!
//! The listeners need the station interface up before they bind.  This
//! adapter validates the credentials, joins the access point with a
//! bounded retry loop, and hands the driver back to `main` so it stays
//! alive for the lifetime of the firmware.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi`.
//! - **all other targets**: only credential validation and the retry
//!   policy are compiled (the host network is assumed to be up).

use core::fmt;
use core::time::Duration;

#[cfg(target_os = "espidf")]
use log::info;
use log::warn;

use crate::config::ServerConfig;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    /// Driver setup failed before any join attempt.
    DriverInit,
    /// Every join attempt failed.
    ConnectionFailed { attempts: u32 },
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(
                f,
                "password invalid (must be 8-64 bytes for WPA2, or empty for open)"
            ),
            Self::DriverInit => write!(f, "WiFi driver initialisation failed"),
            Self::ConnectionFailed { attempts } => {
                write!(f, "WiFi connection failed after {attempts} attempts")
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// Validated station credentials.
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        if ssid.is_empty() && password.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        validate_ssid(ssid)?;
        validate_password(password)?;
        Ok(Self {
            ssid: heapless::String::try_from(ssid).map_err(|()| ConnectivityError::InvalidSsid)?,
            password: heapless::String::try_from(password)
                .map_err(|()| ConnectivityError::InvalidPassword)?,
        })
    }

    /// Credentials baked in at build time (`WIFI_SSID` / `WIFI_PASSWORD`).
    pub fn from_build_env() -> Result<Self, ConnectivityError> {
        match (option_env!("WIFI_SSID"), option_env!("WIFI_PASSWORD")) {
            (Some(ssid), password) => Self::new(ssid, password.unwrap_or("")),
            (None, _) => Err(ConnectivityError::NoCredentials),
        }
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    if !ssid.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Retry policy
// ───────────────────────────────────────────────────────────────

/// Fixed-interval join retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_retries: config.wifi_max_retries,
            interval: Duration::from_millis(u64::from(config.wifi_retry_interval_ms)),
        }
    }

    /// Run `attempt` until it succeeds or the retries are used up.
    ///
    /// The first try is not a retry, so at most `max_retries + 1` attempts
    /// are made.  Returns the number of attempts taken.
    pub fn run<E: fmt::Display>(
        &self,
        mut attempt: impl FnMut(u32) -> Result<(), E>,
    ) -> Result<u32, ConnectivityError> {
        let attempts = self.max_retries.saturating_add(1);
        for n in 1..=attempts {
            match attempt(n) {
                Ok(()) => return Ok(n),
                Err(e) => {
                    warn!("WiFi: attempt {}/{} failed: {}", n, attempts, e);
                    if n < attempts {
                        std::thread::sleep(self.interval);
                    }
                }
            }
        }
        Err(ConnectivityError::ConnectionFailed { attempts })
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF join
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub type StationDriver = esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>;

/// Bring the station interface up and wait for an IP address.
#[cfg(target_os = "espidf")]
pub fn join(
    modem: esp_idf_svc::hal::modem::Modem,
    sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
    nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
    credentials: &WifiCredentials,
    policy: RetryPolicy,
) -> Result<StationDriver, ConnectivityError> {
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

    let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))
        .map_err(|_| ConnectivityError::DriverInit)?;
    let mut wifi =
        BlockingWifi::wrap(esp_wifi, sysloop).map_err(|_| ConnectivityError::DriverInit)?;

    let auth_method = if credentials.is_open() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: credentials.ssid.clone(),
        password: credentials.password.clone(),
        auth_method,
        ..Default::default()
    }))
    .map_err(|_| ConnectivityError::DriverInit)?;
    wifi.start().map_err(|_| ConnectivityError::DriverInit)?;

    info!("WiFi: joining '{}'", credentials.ssid());
    let attempts = policy.run(|_| {
        wifi.connect()?;
        wifi.wait_netif_up()
    })?;

    match wifi.wifi().sta_netif().get_ip_info() {
        Ok(ip) => info!("WiFi: connected after {} attempt(s), IP {}", attempts, ip.ip),
        Err(_) => info!("WiFi: connected after {} attempt(s)", attempts),
    }
    Ok(wifi)
}
