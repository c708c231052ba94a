//! Fixed-capacity register map with linear-scan lookup.
//!
//! Entries live in a `heapless::Vec` in insertion order.  At the store's
//! scale (a few hundred keys) a scan is bounded and cache-friendly.

use heapless::Vec;

use super::{MAX_CAPACITY, RegisterEntry, RegisterKey, RegisterMap};

pub struct LinearRegisterMap {
    entries: Vec<RegisterEntry, MAX_CAPACITY>,
}

impl LinearRegisterMap {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl Default for LinearRegisterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterMap for LinearRegisterMap {
    fn get(&self, key: RegisterKey) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.key() == key)
            .map(|e| e.value)
    }

    fn get_mut(&mut self, key: RegisterKey) -> Option<&mut u16> {
        self.entries
            .iter_mut()
            .find(|e| e.key() == key)
            .map(|e| &mut e.value)
    }

    fn insert(&mut self, key: RegisterKey, value: u16) -> Result<(), u16> {
        self.entries
            .push(RegisterEntry::new(key, value))
            .map_err(|e| e.value)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> impl Iterator<Item = RegisterEntry> + '_ {
        self.entries.iter().copied()
    }
}
