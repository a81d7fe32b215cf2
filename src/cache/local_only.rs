//! Single-tier cache for deployments without a shared store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CacheLayer, CacheStatsReport, LocalLayer};

/// `CacheLayer` backed only by the bounded in-process layer.
#[derive(Debug)]
pub struct LocalOnlyCache {
    local: LocalLayer,
}

impl LocalOnlyCache {
    pub fn new(local: LocalLayer) -> Self {
        Self { local }
    }
}

#[async_trait]
impl CacheLayer for LocalOnlyCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let value = self.local.get(key);
        debug!(key, layer = "local", hit = value.is_some(), "cache get");
        value
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.local.set(key, value, ttl);
    }

    async fn delete(&self, key: &str) {
        self.local.delete(key);
    }

    async fn clear_pattern(&self, pattern: &str) -> u64 {
        if pattern.is_empty() {
            warn!("Empty pattern: clearing the entire cache");
        }
        let removed = self.local.clear_pattern(pattern) as u64;
        info!(pattern, removed, "Cache pattern cleared");
        removed
    }

    fn stats(&self) -> CacheStatsReport {
        let local = self.local.stats();
        CacheStatsReport::new("local", &local, self.local.len(), local.clone(), None)
    }

    fn purge_expired(&self) -> usize {
        self.local.cleanup_expired()
    }
}
