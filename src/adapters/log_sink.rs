//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events to the ESP-IDF
//! logger (UART / USB-CDC in production, stderr on the host).  Connection
//! records keep the single-line tab-separated layout operators grep for.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { capacity } => {
                info!("START | register store ready, capacity={}", capacity);
            }
            AppEvent::ListenerStarted { mode, port } => {
                info!("LISTEN | {} server started on port {}", mode, port);
            }
            AppEvent::Exchange(record) => {
                info!("{}", record);
            }
            AppEvent::ReceiveTimeout { mode, peer } => {
                warn!("TIMEOUT | {} client {} sent no request", mode, peer);
            }
            AppEvent::Stats {
                stats,
                entries,
                capacity,
            } => {
                info!(
                    "STATS | requests={} reads={} writes={} not_found={} rejected={} \
                     full={} | entries={}/{}",
                    stats.total(),
                    stats.reads,
                    stats.writes,
                    stats.not_found,
                    stats.rejected,
                    stats.capacity_rejections,
                    entries,
                    capacity,
                );
            }
        }
    }
}
