//! Cache Module
//!
//! Two interchangeable backends behind one `CacheLayer` contract: a tiered
//! cache (bounded in-process layer in front of Redis) and a local-only cache
//! for single-instance deployments.

mod clock;
mod entry;
mod invalidation;
mod key;
mod local;
mod local_only;
mod remote;
mod stats;
mod tiered;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use invalidation::Invalidator;
pub use key::{canonical_query, query_hash, KeyBuilder, KeyOptions, Namespace};
pub use local::LocalLayer;
pub use local_only::LocalOnlyCache;
pub use remote::{Availability, AvailabilityTracker, RedisStore, RemoteStore};
pub use stats::{CacheStatsReport, LayerStats, RemoteStats, StatsCounters};
pub use tiered::TieredCache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

/// Bytes a value counts against `MAX_VALUE_SIZE`: the raw length of a
/// string, the JSON encoding of anything else.
pub fn value_size(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        other => other.to_string().len(),
    }
}

/// Whether every tier would accept `key` and `value`.
pub fn within_limits(key: &str, value: &Value) -> bool {
    key.len() <= MAX_KEY_LENGTH && value_size(value) <= MAX_VALUE_SIZE
}

// == Cache Contract ==
/// Best-effort cache used by read handlers and middleware.
///
/// No method returns an error: a failing tier degrades to a miss.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Returns the live value for `key`, if any tier holds one.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` for `ttl`. A zero TTL means "already expired" and
    /// removes the key instead.
    async fn set(&self, key: &str, value: Value, ttl: Duration);

    async fn delete(&self, key: &str);

    /// Removes every key containing `pattern`. An empty pattern clears the
    /// whole cache. Returns the number of entries removed.
    async fn clear_pattern(&self, pattern: &str) -> u64;

    fn stats(&self) -> CacheStatsReport;

    /// Drops expired entries from the in-process layer.
    fn purge_expired(&self) -> usize;
}

/// Typed helpers over `CacheLayer` for callers caching their own structs.
#[async_trait]
pub trait CacheLayerExt: CacheLayer {
    /// Like `get`, but decodes into `T`; undecodable values count as absent.
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(key, error = %err, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Like `set`, but encodes `value` first; unencodable values are skipped.
    async fn set_as<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(encoded) => self.set(key, encoded, ttl).await,
            Err(err) => warn!(key, error = %err, "value not cacheable"),
        }
    }
}

impl<C: CacheLayer + ?Sized> CacheLayerExt for C {}

// == Backend Selection ==
/// Builds the backend `config` asks for: tiered when a Redis host is set,
/// local-only otherwise.
pub async fn build_cache(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn CacheLayer>> {
    let local = LocalLayer::new(config.local_max_keys, clock);

    match &config.remote {
        Some(remote) => {
            let store = RedisStore::new(remote)?;
            let cache = TieredCache::new(
                local,
                Arc::new(store),
                Duration::from_secs(config.promotion_ttl),
            );
            let availability = cache.connect().await;
            info!(
                host = %remote.host,
                port = remote.port,
                db = remote.db,
                ?availability,
                "Tiered cache initialized"
            );
            Ok(Arc::new(cache))
        }
        None => {
            info!("No remote cache configured, using local-only cache");
            Ok(Arc::new(LocalOnlyCache::new(local)))
        }
    }
}
