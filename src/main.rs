//! Register Server Firmware: Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  ServerTransport (tcp)   ServerTransport (tls)   LogEventSink  │
//! │        │                        │                (EventSink)   │
//! │   tcp-io thread            tls-io thread                       │
//! │        └──────── RequestBus (embassy-sync) ───┐                │
//! │                                               ▼                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │     RegisterService (pure logic, owns RegisterStore)   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  WiFi STA (join with retry) · CertStore (NVS `certs`)          │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Instant;

use anyhow::Result;
use futures_lite::future;
use log::{info, warn};

use regserver::adapters::cert_store::CertStore;
use regserver::adapters::log_sink::LogEventSink;
use regserver::adapters::tcp_server::Listeners;
use regserver::adapters::wifi::{self, RetryPolicy, WifiCredentials};
use regserver::app::service::RegisterService;
use regserver::config::ServerConfig;
use regserver::error::Error;
use regserver::proto::channels::RequestBus;
use regserver::proto::io_task::{self, ListenerTiming};

/// Shared between both listener threads and the dispatcher below.
static BUS: RequestBus = RequestBus::new();

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RegServer v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = ServerConfig::from_build_env().map_err(Error::from)?;
    info!(
        "Config: tcp={} tls={} capacity={} recv_timeout={}ms",
        config.plain_port, config.secure_port, config.store_capacity, config.recv_timeout_ms
    );

    // ── 3. Platform + network ─────────────────────────────────
    let peripherals = esp_idf_svc::hal::peripherals::Peripherals::take()
        .map_err(|_| Error::Init("peripherals already taken"))?;
    let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()
        .map_err(|_| Error::Init("system event loop unavailable"))?;
    let nvs = esp_idf_svc::nvs::EspDefaultNvsPartition::take()
        .map_err(|_| Error::Init("default NVS partition unavailable"))?;

    let credentials = WifiCredentials::from_build_env().map_err(Error::from)?;
    // Held for the life of the program; dropping it tears down the station.
    let _wifi = wifi::join(
        peripherals.modem,
        sysloop,
        nvs.clone(),
        &credentials,
        RetryPolicy::from_config(&config),
    )
    .map_err(Error::from)?;

    // ── 4. Listeners ──────────────────────────────────────────
    // A missing TLS identity or a failed secure bind leaves the plain
    // listener running on its own.
    let identity = CertStore::new(nvs).load_identity();
    let listeners = Listeners::bind(&config, identity).map_err(Error::from)?;

    let timing = ListenerTiming::from_config(&config);
    let _tcp_io = io_task::spawn(listeners.plain, &BUS, timing)?;
    let _tls_io = match listeners.secure {
        Some(secure) => Some(io_task::spawn(secure, &BUS, timing)?),
        None => {
            warn!("Serving non-secure connections only");
            None
        }
    };

    // ── 5. Dispatcher ─────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut service = RegisterService::new(&config);
    service.start(&mut sink);

    let stats_interval = config.stats_interval();
    let mut last_report = Instant::now();
    loop {
        future::block_on(BUS.serve_one(&mut service));
        if last_report.elapsed() >= stats_interval {
            service.report(&mut sink);
            last_report = Instant::now();
        }
    }
}
