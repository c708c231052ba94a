//! Fixed-capacity register map backed by a hash index.
//!
//! Drop-in alternative to [`LinearRegisterMap`](super::LinearRegisterMap)
//! when constant-time lookup matters more than insertion order.

use heapless::FnvIndexMap;

use super::{MAX_CAPACITY, RegisterEntry, RegisterKey, RegisterMap};

pub struct IndexedRegisterMap {
    // Index size must be a power of two.
    index: FnvIndexMap<RegisterKey, u16, MAX_CAPACITY>,
}

impl IndexedRegisterMap {
    pub fn new() -> Self {
        Self {
            index: FnvIndexMap::new(),
        }
    }
}

impl Default for IndexedRegisterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterMap for IndexedRegisterMap {
    fn get(&self, key: RegisterKey) -> Option<u16> {
        self.index.get(&key).copied()
    }

    fn get_mut(&mut self, key: RegisterKey) -> Option<&mut u16> {
        self.index.get_mut(&key)
    }

    fn insert(&mut self, key: RegisterKey, value: u16) -> Result<(), u16> {
        match self.index.insert(key, value) {
            Ok(_) => Ok(()),
            Err((_, value)) => Err(value),
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn entries(&self) -> impl Iterator<Item = RegisterEntry> + '_ {
        self.index
            .iter()
            .map(|(key, value)| RegisterEntry::new(*key, *value))
    }
}
