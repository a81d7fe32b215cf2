//! Bounded Local Layer
//!
//! In-process key/entry map with per-key TTL, lazy expiry and a hard cap on
//! the number of keys. Every method is synchronous: the mutex is held only for
//! the map operation and never across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{
    value_size, CacheEntry, Clock, LayerStats, StatsCounters, MAX_KEY_LENGTH, MAX_VALUE_SIZE,
};

// == Local Layer ==
/// Capacity-bounded TTL store for the fast tier.
#[derive(Debug)]
pub struct LocalLayer {
    /// Key-value storage
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Performance statistics
    stats: StatsCounters,
    /// Maximum number of keys allowed
    max_keys: usize,
    clock: Arc<dyn Clock>,
}

impl LocalLayer {
    // == Constructor ==
    /// Creates a layer holding at most `max_keys` keys (at least one).
    pub fn new(max_keys: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: StatsCounters::new(),
            max_keys: max_keys.max(1),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    layer = "local",
                    result = "poisoned_recovered",
                    "Recovered from poisoned cache lock"
                );
                poisoned.into_inner()
            }
        }
    }

    // == Get ==
    /// Returns the live entry for `key`, dropping it if it has expired.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now_ms();
        let live = {
            let mut entries = self.lock();
            let live = entries.get(key).filter(|e| !e.is_expired(now)).cloned();
            if live.is_none() {
                entries.remove(key);
            }
            live
        };

        if live.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        live
    }

    /// Returns the live value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).map(|entry| entry.value)
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl`, overwriting any previous entry.
    ///
    /// A zero TTL removes the key instead of storing an already-dead entry.
    /// Keys or values over the size limits are not stored, and any previous
    /// entry for the key is dropped.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            self.lock().remove(key);
            return;
        }

        // A skipped overwrite must not leave the previous value readable
        if key.len() > MAX_KEY_LENGTH {
            debug!(key_len = key.len(), "local set skipped: key too long");
            self.lock().remove(key);
            return;
        }

        if value_size(&value) > MAX_VALUE_SIZE {
            debug!(key, "local set skipped: value too large");
            self.lock().remove(key);
            return;
        }

        let now = self.clock.now_ms();
        let evicted = {
            let mut entries = self.lock();
            let evicted = if entries.contains_key(key) {
                0
            } else {
                make_room(&mut entries, self.max_keys, now)
            };
            entries.insert(key.to_string(), CacheEntry::new(value, now, ttl));
            evicted
        };

        self.stats.record_set();
        if evicted > 0 {
            self.stats.record_evictions(evicted as u64);
        }
    }

    // == Delete ==
    /// Removes `key`; returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.stats.record_delete();
        }
        removed
    }

    // == Clear Pattern ==
    /// Removes every key containing `pattern`. An empty pattern removes all.
    pub fn clear_pattern(&self, pattern: &str) -> usize {
        let removed = {
            let mut entries = self.lock();
            let before = entries.len();
            if pattern.is_empty() {
                entries.clear();
            } else {
                entries.retain(|key, _| !key.contains(pattern));
            }
            before - entries.len()
        };

        self.stats.record_deletes(removed as u64);
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        sweep_expired(&mut entries, now)
    }

    // == Length ==
    /// Number of keys physically present, including expired ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> LayerStats {
        self.stats.snapshot()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn sweep_expired(entries: &mut HashMap<String, CacheEntry>, now: u64) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

/// Frees one slot for a new key: expired entries go first, then the entry
/// closest to expiry. Returns the number of live entries evicted.
fn make_room(entries: &mut HashMap<String, CacheEntry>, max_keys: usize, now: u64) -> usize {
    if entries.len() < max_keys {
        return 0;
    }

    sweep_expired(entries, now);

    let mut evicted = 0;
    while entries.len() >= max_keys {
        let soonest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());

        match soonest {
            Some(key) => {
                entries.remove(&key);
                evicted += 1;
            }
            None => break,
        }
    }
    evicted
}
