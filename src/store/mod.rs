//! Device register store.
//!
//! Maps a `(device_id, reg_id)` key to the most recently written 16-bit
//! value.  The store is memory-resident and owned by exactly one
//! [`RegisterService`](crate::app::service::RegisterService); nothing here
//! locks, blocks or allocates.
//!
//! ```text
//!   RegisterStore ──▶ RegisterMap (trait)
//!                        ├── LinearRegisterMap   (fixed vec, linear scan)
//!                        └── IndexedRegisterMap  (fixed hash index)
//! ```
//!
//! ## Capacity policy
//!
//! The store never holds more than `capacity` entries.  Once full, writes
//! of *new* keys are rejected with [`CapacityError`]; writes of keys that
//! already exist are always accepted.

use core::fmt;

use log::warn;

pub mod indexed;
pub mod linear;

pub use indexed::IndexedRegisterMap;
pub use linear::LinearRegisterMap;

/// Upper bound on the configurable capacity (backing storage size).
pub const MAX_CAPACITY: usize = 512;

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 400;

// ───────────────────────────────────────────────────────────────
// Entry types
// ───────────────────────────────────────────────────────────────

/// Composite lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterKey {
    pub device_id: u16,
    pub reg_id: u8,
}

impl RegisterKey {
    pub const fn new(device_id: u16, reg_id: u8) -> Self {
        Self { device_id, reg_id }
    }
}

/// A stored register value together with its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    pub device_id: u16,
    pub reg_id: u8,
    pub value: u16,
}

impl RegisterEntry {
    pub const fn new(key: RegisterKey, value: u16) -> Self {
        Self {
            device_id: key.device_id,
            reg_id: key.reg_id,
            value,
        }
    }

    pub const fn key(&self) -> RegisterKey {
        RegisterKey::new(self.device_id, self.reg_id)
    }
}

/// A write of a new key was rejected because the store is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// Number of entries held when the write was rejected.
    pub count: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "register store full ({} entries)", self.count)
    }
}

// ───────────────────────────────────────────────────────────────
// Map abstraction
// ───────────────────────────────────────────────────────────────

/// Key → value storage behind a [`RegisterStore`].
///
/// Implementations only need exact-key lookup; iteration order is
/// unspecified.  Capacity policy lives in the store, not in the map.
pub trait RegisterMap {
    /// Look up the value stored for `key`.
    fn get(&self, key: RegisterKey) -> Option<u16>;

    /// Mutable access to the value stored for `key`.
    fn get_mut(&mut self, key: RegisterKey) -> Option<&mut u16>;

    /// Insert a key that is not yet present.
    ///
    /// Returns `Err(value)` if the backing storage is exhausted.
    fn insert(&mut self, key: RegisterKey, value: u16) -> Result<(), u16>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// Whether the map holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every stored entry.
    fn entries(&self) -> impl Iterator<Item = RegisterEntry> + '_;
}

// ───────────────────────────────────────────────────────────────
// RegisterStore
// ───────────────────────────────────────────────────────────────

/// Bounded register store.
pub struct RegisterStore<M = LinearRegisterMap> {
    map: M,
    capacity: usize,
}

impl RegisterStore<LinearRegisterMap> {
    /// Create an empty store backed by a linear-scan map.
    pub fn new(capacity: usize) -> Self {
        Self::with_map(LinearRegisterMap::new(), capacity)
    }
}

impl Default for RegisterStore<LinearRegisterMap> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<M: RegisterMap> RegisterStore<M> {
    /// Create a store on top of an existing (normally empty) map.
    ///
    /// `capacity` is clamped to `1..=MAX_CAPACITY`.
    pub fn with_map(map: M, capacity: usize) -> Self {
        let clamped = capacity.clamp(1, MAX_CAPACITY);
        if clamped != capacity {
            warn!(
                "STORE: capacity {} out of range, clamped to {}",
                capacity, clamped
            );
        }
        Self {
            map,
            capacity: clamped,
        }
    }

    /// Look up the entry for `(device_id, reg_id)`.
    pub fn find(&self, device_id: u16, reg_id: u8) -> Option<RegisterEntry> {
        let key = RegisterKey::new(device_id, reg_id);
        self.map.get(key).map(|value| RegisterEntry::new(key, value))
    }

    /// Store `value` under `(device_id, reg_id)`.
    ///
    /// Existing keys are overwritten in place.  New keys are inserted only
    /// while `count() < capacity()`.
    pub fn write(
        &mut self,
        device_id: u16,
        reg_id: u8,
        value: u16,
    ) -> Result<RegisterEntry, CapacityError> {
        let key = RegisterKey::new(device_id, reg_id);

        if let Some(slot) = self.map.get_mut(key) {
            *slot = value;
            return Ok(RegisterEntry::new(key, value));
        }

        let count = self.map.len();
        if count >= self.capacity {
            return Err(CapacityError { count });
        }

        self.map
            .insert(key, value)
            .map_err(|_| CapacityError { count })?;
        Ok(RegisterEntry::new(key, value))
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.map.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.map.len() >= self.capacity
    }

    /// Every stored entry, in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = RegisterEntry> + '_ {
        self.map.entries()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
