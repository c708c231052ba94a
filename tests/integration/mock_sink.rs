//! Recording event sink for integration tests.
//!
//! Clones share one event log, so a sink moved into a listener thread can
//! still be inspected from the test thread.

use std::sync::{Arc, Mutex};

use regserver::app::events::{AppEvent, ConnectionRecord};
use regserver::app::ports::EventSink;

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<AppEvent>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Connection records in emission order.
    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AppEvent::Exchange(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn timeouts(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, AppEvent::ReceiveTimeout { .. }))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
