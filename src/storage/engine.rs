//! Keyspace Storage Engine
//!
//! The [`Store`] owns every key, its value and its expiration instant. It
//! is not thread-safe; the server's event loop is the only code that
//! ever touches it.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Store                            │
//! │                                                          │
//! │  keyspace: key ──► Slot { seq, Value }                   │
//! │  order:    seq ──► key          (insertion order)        │
//! │  expires:  key ──► Deadline { at, slot }                 │
//! │  volatile: slot ──► key         (dense, for sampling)    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Expiry
//!
//! Every lookup first runs [`Store::expire_if_due`]: if the key's recorded
//! instant is at or before the clock's reading, the key and its expiration
//! are deleted before the lookup reports "not found". Active reclamation
//! lives in [`crate::storage::expiry`] and reuses the same check.

use crate::storage::clock::Clock;
use crate::storage::zset::ZSet;
use bytes::Bytes;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    SortedSet(ZSet),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "string",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
        }
    }
}

/// A key's value plus its position in insertion order.
#[derive(Debug)]
struct Slot {
    seq: u64,
    value: Value,
}

/// Expiration instant of a key and its index in `Store::volatile`.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: f64,
    slot: usize,
}

/// Counters describing the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys currently held, including expired keys not yet reclaimed.
    pub keys: usize,
    /// Keys with an expiration instant.
    pub volatile_keys: usize,
    /// Keys removed by the expiry check, from lookups or the sweeper.
    pub expired_keys: u64,
}

pub struct Store {
    keyspace: HashMap<Bytes, Slot>,
    order: BTreeMap<u64, Bytes>,
    expires: HashMap<Bytes, Deadline>,
    volatile: Vec<Bytes>,
    next_seq: u64,
    expired_keys: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.keyspace.len())
            .field("volatile_keys", &self.expires.len())
            .field("expired_keys", &self.expired_keys)
            .finish()
    }
}

impl Store {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: HashMap::new(),
            order: BTreeMap::new(),
            expires: HashMap::new(),
            volatile: Vec::new(),
            next_seq: 0,
            expired_keys: 0,
            clock,
        }
    }

    /// Current reading of the store's clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Deletes `key` if its expiration instant has passed.
    ///
    /// Returns `true` if the key was expired and removed.
    pub fn expire_if_due(&mut self, key: &[u8]) -> bool {
        let due = match self.expires.get(key) {
            Some(deadline) => deadline.at <= self.clock.now(),
            None => false,
        };

        if due {
            self.remove(key);
            self.expired_keys += 1;
            trace!(key = %String::from_utf8_lossy(key), "Key expired");
        }
        due
    }

    /// Looks up a live value, expiring it first if due.
    pub fn get(&mut self, key: &[u8]) -> Option<&Value> {
        self.expire_if_due(key);
        self.keyspace.get(key).map(|slot| &slot.value)
    }

    /// Mutable lookup of a live value, expiring it first if due.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.expire_if_due(key);
        self.keyspace.get_mut(key).map(|slot| &mut slot.value)
    }

    /// Returns the live value at `key`, inserting the result of `make` if absent.
    pub fn get_or_insert_with(&mut self, key: Bytes, make: impl FnOnce() -> Value) -> &mut Value {
        self.expire_if_due(&key);
        let next_seq = &mut self.next_seq;
        let order = &mut self.order;
        let slot = self.keyspace.entry(key).or_insert_with_key(|key| {
            let seq = *next_seq;
            *next_seq += 1;
            order.insert(seq, key.clone());
            Slot { seq, value: make() }
        });
        &mut slot.value
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` at `key` and clears any expiration on it.
    ///
    /// An existing key keeps its place in insertion order.
    pub fn set(&mut self, key: Bytes, value: Value) {
        self.clear_expiry(&key);
        match self.keyspace.get_mut(&key) {
            Some(slot) => slot.value = value,
            None => self.insert_new(key, value),
        }
    }

    fn insert_new(&mut self, key: Bytes, value: Value) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.keyspace.insert(key, Slot { seq, value });
    }

    /// Removes the value and any expiration. Returns the removed value.
    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.clear_expiry(key);
        let slot = self.keyspace.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.value)
    }

    /// Sets `key` to expire `millis` milliseconds from now.
    ///
    /// Only applies to a live key; returns `false` otherwise.
    pub fn expire_in_millis(&mut self, key: &[u8], millis: i64) -> bool {
        if !self.contains(key) {
            return false;
        }
        let at = self.clock.now() + millis as f64 / 1000.0;
        match self.keyspace.get_key_value(key) {
            Some((stored, _)) => {
                let stored = stored.clone();
                self.set_expiry(stored, at);
                true
            }
            None => false,
        }
    }

    /// Absolute expiration instant of `key`, if any.
    pub fn expires_at(&self, key: &[u8]) -> Option<f64> {
        self.expires.get(key).map(|deadline| deadline.at)
    }

    fn set_expiry(&mut self, key: Bytes, at: f64) {
        match self.expires.get_mut(&key) {
            Some(deadline) => deadline.at = at,
            None => {
                let slot = self.volatile.len();
                self.expires.insert(key.clone(), Deadline { at, slot });
                self.volatile.push(key);
            }
        }
    }

    /// Drops the expiration of `key`. The last volatile key moves into the
    /// freed slot.
    fn clear_expiry(&mut self, key: &[u8]) {
        let Some(removed) = self.expires.remove(key) else {
            return;
        };
        self.volatile.swap_remove(removed.slot);
        if let Some(moved) = self.volatile.get(removed.slot) {
            if let Some(deadline) = self.expires.get_mut(moved) {
                deadline.slot = removed.slot;
            }
        }
    }

    /// Live keys in the order they were first set.
    pub fn keys(&mut self) -> Vec<Bytes> {
        let now = self.clock.now();
        let due: Vec<Bytes> = self
            .expires
            .iter()
            .filter(|(_, deadline)| deadline.at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.expire_if_due(key);
        }
        self.order.values().cloned().collect()
    }

    /// Up to `amount` distinct keys that carry an expiration, chosen
    /// uniformly at random. Costs O(amount) regardless of how many volatile
    /// keys exist.
    pub fn sample_volatile<R: Rng + ?Sized>(&self, rng: &mut R, amount: usize) -> Vec<Bytes> {
        let amount = amount.min(self.volatile.len());
        rand::seq::index::sample(rng, self.volatile.len(), amount)
            .into_iter()
            .map(|slot| self.volatile[slot].clone())
            .collect()
    }

    /// Number of keys held, including expired keys not yet reclaimed.
    pub fn len(&self) -> usize {
        self.keyspace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyspace.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.keyspace.len(),
            volatile_keys: self.expires.len(),
            expired_keys: self.expired_keys,
        }
    }
}
