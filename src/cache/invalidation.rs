//! Invalidation hooks for mutation handlers.
//!
//! Await these after a write succeeds and before its response is returned, so
//! the next read in this process cannot see the pre-write value. Other
//! instances only converge through TTL expiry or the shared tier.

use std::sync::Arc;

use tracing::{debug, info};

use super::{CacheLayer, KeyBuilder, KeyOptions, Namespace};

/// Namespaces whose output depends on story content.
const CONTENT_NAMESPACES: [Namespace; 4] = [
    Namespace::STORY,
    Namespace::LIST,
    Namespace::FEED,
    Namespace::STATS,
];

#[derive(Clone)]
pub struct Invalidator {
    cache: Arc<dyn CacheLayer>,
    keys: KeyBuilder,
}

impl Invalidator {
    pub fn new(cache: Arc<dyn CacheLayer>, keys: KeyBuilder) -> Self {
        Self { cache, keys }
    }

    /// Evicts every key in `namespace`. Returns the number of entries removed.
    pub async fn invalidate(&self, namespace: &Namespace) -> u64 {
        let removed = self
            .cache
            .clear_pattern(&self.keys.namespace_prefix(namespace))
            .await;
        info!(%namespace, removed, "Namespace invalidated");
        removed
    }

    /// Evicts one identifier together with its query and caller variants.
    ///
    /// For routes behind the response cache the identifier is the request
    /// path, e.g. `/stories/abc123`. Returns the number of variants removed
    /// besides the plain key.
    pub async fn invalidate_key(&self, namespace: &Namespace, identifier: &str) -> u64 {
        let key = self.keys.build(namespace, identifier, &KeyOptions::default());
        self.cache.delete(&key).await;

        let removed = self
            .cache
            .clear_pattern(&self.keys.variants_pattern(namespace, identifier))
            .await;
        debug!(%namespace, identifier, removed, "Key invalidated");
        removed
    }

    /// Fan-out for story create/update/delete: the story itself, lists,
    /// feeds and aggregated statistics.
    pub async fn content_changed(&self) -> u64 {
        let mut removed = 0;
        for namespace in &CONTENT_NAMESPACES {
            removed += self.invalidate(namespace).await;
        }
        removed
    }
}
