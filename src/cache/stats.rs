//! Cache Statistics Module
//!
//! Per-layer counters for hits, misses, sets, deletes, evictions and remote
//! errors. Counters only grow for the lifetime of the process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::remote::Availability;

// == Counters ==
/// Live counters for one layer, shared by every caller.
#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.record_deletes(1);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters into a serializable snapshot.
    pub fn snapshot(&self) -> LayerStats {
        LayerStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.sets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

// == Snapshots ==
/// Point-in-time statistics for one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub errors: u64,
    /// hits / (hits + misses), 0.0 when nothing was read
    pub hit_rate: f64,
}

impl LayerStats {
    pub fn new(hits: u64, misses: u64, sets: u64, deletes: u64, evictions: u64, errors: u64) -> Self {
        Self {
            hits,
            misses,
            sets,
            deletes,
            evictions,
            errors,
            hit_rate: hit_rate(hits, misses),
        }
    }
}

/// Statistics for the shared tier together with its availability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteStats {
    pub availability: Availability,
    #[serde(flatten)]
    pub counters: LayerStats,
}

/// Statistics for a whole cache backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsReport {
    /// `"tiered"` or `"local"`
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_rate: f64,
    /// Keys currently held in process, including expired ones not yet swept
    pub local_entries: usize,
    pub local: LayerStats,
    pub remote: Option<RemoteStats>,
}

impl CacheStatsReport {
    /// Builds the report for a backend whose overall counters are `overall`.
    pub fn new(
        backend: &'static str,
        overall: &LayerStats,
        local_entries: usize,
        local: LayerStats,
        remote: Option<RemoteStats>,
    ) -> Self {
        Self {
            backend,
            hits: overall.hits,
            misses: overall.misses,
            sets: overall.sets,
            deletes: overall.deletes,
            hit_rate: overall.hit_rate,
            local_entries,
            local,
            remote,
        }
    }
}

/// Calculates hits / (hits + misses), or 0.0 if no requests have been made.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsCounters::new().snapshot();
        assert_eq!(stats, LayerStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(hit_rate(0, 0), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let counters = StatsCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        assert_eq!(counters.snapshot().hit_rate, 1.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = StatsCounters::new();
        counters.record_hit();
        counters.record_miss();
        assert_eq!(counters.snapshot().hit_rate, 0.5);
    }

    #[test]
    fn test_counters_accumulate() {
        let counters = StatsCounters::new();
        counters.record_set();
        counters.record_set();
        counters.record_delete();
        counters.record_evictions(3);
        counters.record_error();

        let stats = counters.snapshot();
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_remote_stats_flatten() {
        let remote = RemoteStats {
            availability: Availability::Unavailable,
            counters: LayerStats::new(1, 3, 0, 0, 0, 2),
        };
        let json = serde_json::to_value(&remote).unwrap();
        assert_eq!(json["availability"], "unavailable");
        assert_eq!(json["misses"], 3);
        assert_eq!(json["hit_rate"], 0.25);
    }
}
