//! Register service: the single owner of the register store.
//!
//! [`RegisterService`] turns one request line into one response.  It is
//! driven by the dispatcher side of the
//! [`RequestBus`](crate::proto::channels::RequestBus), so every store
//! access happens in one execution context and nothing here locks.
//!
//! ```text
//!  line ──▶ parse ──▶ ┌──────────────────┐ ──▶ Response
//!                     │ RegisterService  │
//!                     │   RegisterStore  │
//!                     └──────────────────┘
//! ```

use log::{info, warn};

use crate::config::ServerConfig;
use crate::proto::request::{self, Request};
use crate::proto::response::Response;
use crate::store::{LinearRegisterMap, RegisterMap, RegisterStore};

use super::events::AppEvent;
use super::ports::EventSink;

/// Request counters since start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub reads: u32,
    pub writes: u32,
    pub not_found: u32,
    pub rejected: u32,
    pub capacity_rejections: u32,
}

impl ServiceStats {
    /// Total requests handled, valid or not.
    pub fn total(&self) -> u32 {
        self.reads
            .saturating_add(self.writes)
            .saturating_add(self.rejected)
    }
}

// ───────────────────────────────────────────────────────────────
// RegisterService
// ───────────────────────────────────────────────────────────────

pub struct RegisterService<M = LinearRegisterMap> {
    store: RegisterStore<M>,
    stats: ServiceStats,
}

impl RegisterService<LinearRegisterMap> {
    /// Build the service with an empty store sized from `config`.
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_store(RegisterStore::new(config.store_capacity))
    }
}

impl<M: RegisterMap> RegisterService<M> {
    pub fn with_store(store: RegisterStore<M>) -> Self {
        Self {
            store,
            stats: ServiceStats::default(),
        }
    }

    /// Announce readiness.
    pub fn start(&self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started {
            capacity: self.store.capacity(),
        });
        info!(
            "SVC: register service ready (capacity={})",
            self.store.capacity()
        );
    }

    /// Handle one request line and produce its response.
    pub fn handle_line(&mut self, line: &[u8]) -> Response {
        match request::parse(line) {
            Ok(req) => self.handle_request(req),
            Err(e) => {
                self.stats.rejected = self.stats.rejected.saturating_add(1);
                warn!("SVC: rejected {}-byte line: {}", line.len(), e);
                Response::Rejected(e)
            }
        }
    }

    /// Dispatch a validated request to the store.
    pub fn handle_request(&mut self, req: Request) -> Response {
        match req {
            Request::Read { key } => {
                self.stats.reads = self.stats.reads.saturating_add(1);
                match self.store.find(key.device_id, key.reg_id) {
                    Some(entry) => Response::Ack(entry),
                    None => {
                        self.stats.not_found = self.stats.not_found.saturating_add(1);
                        Response::NotFound
                    }
                }
            }
            Request::Write { key, value } => {
                self.stats.writes = self.stats.writes.saturating_add(1);
                match self.store.write(key.device_id, key.reg_id, value) {
                    Ok(entry) => Response::Ack(entry),
                    Err(e) => {
                        self.stats.capacity_rejections =
                            self.stats.capacity_rejections.saturating_add(1);
                        warn!("SVC: {}", e);
                        Response::DatabaseFull { count: e.count }
                    }
                }
            }
        }
    }

    /// Emit a statistics snapshot.
    pub fn report(&self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Stats {
            stats: self.stats,
            entries: self.store.count(),
            capacity: self.store.capacity(),
        });
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats
    }

    pub fn store(&self) -> &RegisterStore<M> {
        &self.store
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
