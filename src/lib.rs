//! Blog Cache - two-tier response cache for a content-serving blog
//!
//! A bounded in-process layer in front of a shared Redis tier, with a
//! local-only fallback, request-caching middleware, invalidation hooks and
//! an authenticated admin surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{build_cache, CacheLayer, CacheLayerExt, Invalidator, KeyBuilder, Namespace};
pub use config::Config;
pub use middleware::{CallerIdentity, ResponseCache};
pub use tasks::spawn_sweep_task;
