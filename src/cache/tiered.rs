//! Tiered Cache Manager
//!
//! Read-through with promotion, write-through and pattern invalidation over
//! the bounded local layer and the shared remote layer. Remote failures are
//! absorbed here: they change the availability state and the statistics, and
//! the caller sees a miss at worst.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::remote::AvailabilityTracker;
use super::{
    Availability, CacheEntry, CacheLayer, CacheStatsReport, LocalLayer, RemoteStats, RemoteStore,
    StatsCounters,
};
use crate::error::CacheError;

/// Local layer in front of a shared `RemoteStore`.
pub struct TieredCache {
    local: LocalLayer,
    remote: Arc<dyn RemoteStore>,
    availability: AvailabilityTracker,
    remote_stats: StatsCounters,
    /// Outcome of whole-cache operations, independent of the tier that served them
    overall: StatsCounters,
    /// Upper bound on the lifetime of values copied up from the remote tier
    promotion_ttl: Duration,
}

impl TieredCache {
    pub fn new(local: LocalLayer, remote: Arc<dyn RemoteStore>, promotion_ttl: Duration) -> Self {
        Self {
            local,
            remote,
            availability: AvailabilityTracker::new(),
            remote_stats: StatsCounters::new(),
            overall: StatsCounters::new(),
            promotion_ttl,
        }
    }

    /// Pings the remote tier once so availability leaves `Unknown`.
    pub async fn connect(&self) -> Availability {
        match self.remote.ping().await {
            Ok(()) => self.remote_succeeded(),
            Err(err) => self.remote_failed("connect", &err),
        }
        self.availability.current()
    }

    pub fn availability(&self) -> Availability {
        self.availability.current()
    }

    fn now(&self) -> u64 {
        self.local.clock().now_ms()
    }

    fn remote_permitted(&self) -> bool {
        self.availability.should_attempt(self.now())
    }

    fn remote_succeeded(&self) {
        if self.availability.mark_success() != Availability::Available {
            info!(layer = "remote", "Remote cache available");
        }
    }

    fn remote_failed(&self, op: &'static str, err: &CacheError) {
        self.remote_stats.record_error();
        match self.availability.mark_failure(self.now()) {
            Availability::Unavailable => {
                debug!(layer = "remote", op, error = %err, "Remote cache still unavailable")
            }
            _ => warn!(layer = "remote", op, error = %err, "Remote cache unavailable, degrading to local only"),
        }
    }

    /// Fetches and decodes a remote entry; `None` on miss, error or expiry.
    async fn remote_get(&self, key: &str) -> Option<CacheEntry> {
        if !self.remote_permitted() {
            return None;
        }

        let payload = match self.remote.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.remote_succeeded();
                return None;
            }
            Err(err) => {
                self.remote_failed("get", &err);
                return None;
            }
        };
        self.remote_succeeded();

        match CacheEntry::from_payload(&payload) {
            Ok(entry) if !entry.is_expired(self.now()) => Some(entry),
            Ok(_) => None,
            Err(err) => {
                warn!(key, error = %err, "Undecodable remote entry ignored");
                None
            }
        }
    }

    fn promote(&self, key: &str, entry: &CacheEntry) {
        let ttl = self.promotion_ttl.min(entry.remaining(self.now()));
        if !ttl.is_zero() {
            self.local.set(key, entry.value.clone(), ttl);
        }
    }
}

#[async_trait]
impl CacheLayer for TieredCache {
    async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.local.get(key) {
            self.overall.record_hit();
            debug!(key, layer = "local", outcome = "hit", "cache get");
            return Some(value);
        }

        match self.remote_get(key).await {
            Some(entry) => {
                self.remote_stats.record_hit();
                self.overall.record_hit();
                self.promote(key, &entry);
                debug!(key, layer = "remote", outcome = "hit", "cache get");
                Some(entry.value)
            }
            None => {
                self.remote_stats.record_miss();
                self.overall.record_miss();
                debug!(key, outcome = "miss", "cache get");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.overall.record_set();

        if ttl.is_zero() {
            self.local.set(key, value, ttl);
            if self.remote_permitted() {
                match self.remote.delete(key).await {
                    Ok(()) => self.remote_succeeded(),
                    Err(err) => self.remote_failed("set", &err),
                }
            }
            return;
        }

        let entry = CacheEntry::new(value, self.now(), ttl);
        let payload = match entry.to_payload() {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(key, error = %err, "Remote set skipped: value not encodable");
                None
            }
        };

        self.local.set(key, entry.value, ttl);

        let Some(payload) = payload else { return };
        if !self.remote_permitted() {
            return;
        }

        match self.remote.set(key, payload, ttl).await {
            Ok(()) => {
                self.remote_succeeded();
                self.remote_stats.record_set();
            }
            Err(err) => self.remote_failed("set", &err),
        }
    }

    async fn delete(&self, key: &str) {
        self.overall.record_delete();
        self.local.delete(key);

        if !self.remote_permitted() {
            return;
        }

        match self.remote.delete(key).await {
            Ok(()) => {
                self.remote_succeeded();
                self.remote_stats.record_delete();
            }
            Err(err) => self.remote_failed("delete", &err),
        }
    }

    async fn clear_pattern(&self, pattern: &str) -> u64 {
        if pattern.is_empty() {
            warn!("Empty pattern: clearing the entire cache");
        }

        let local_removed = self.local.clear_pattern(pattern) as u64;

        let remote_removed = if self.remote_permitted() {
            match self.remote.delete_matching(pattern).await {
                Ok(removed) => {
                    self.remote_succeeded();
                    self.remote_stats.record_deletes(removed);
                    removed
                }
                Err(err) => {
                    self.remote_failed("clear_pattern", &err);
                    0
                }
            }
        } else {
            0
        };

        self.overall.record_deletes(local_removed.max(remote_removed));
        info!(pattern, local_removed, remote_removed, "Cache pattern cleared");
        local_removed + remote_removed
    }

    fn stats(&self) -> CacheStatsReport {
        let remote = RemoteStats {
            availability: self.availability.current(),
            counters: self.remote_stats.snapshot(),
        };
        CacheStatsReport::new(
            "tiered",
            &self.overall.snapshot(),
            self.local.len(),
            self.local.stats(),
            Some(remote),
        )
    }

    fn purge_expired(&self) -> usize {
        self.local.cleanup_expired()
    }
}
