//! HTTP middleware
//!
//! Response caching for read routes.

mod response_cache;

pub use response_cache::{etag, CachedResponse, CallerIdentity, ResponseCache, X_CACHE};
