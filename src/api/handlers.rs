//! API Handlers
//!
//! Admin and health endpoints plus the bearer-token guard for the admin
//! routes.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Json,
};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::cache::{CacheLayer, CacheStatsReport, Invalidator, KeyBuilder, MAX_KEY_LENGTH};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::middleware::ResponseCache;
use crate::models::{ClearRequest, ClearResponse, DeleteResponse, HealthResponse};

/// Application state shared across all handlers.
///
/// Holds the one cache backend chosen at startup together with the
/// request-caching middleware and invalidation hooks built on top of it, so
/// content routes and mutation handlers share the same instance.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn CacheLayer>,
    pub responses: ResponseCache,
    pub invalidator: Invalidator,
    admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(cache: Arc<dyn CacheLayer>, config: &Config) -> Self {
        let keys = KeyBuilder::new(config.cache_version.clone());
        Self {
            responses: ResponseCache::new(cache.clone(), keys.clone(), config.ttl_policy.clone()),
            invalidator: Invalidator::new(cache.clone(), keys),
            cache,
            admin_token: config.admin_token.as_deref().map(Arc::from),
        }
    }

    /// Constant-time comparison against the configured admin token. Always
    /// false when no token is configured.
    pub fn is_admin(&self, presented: &str) -> bool {
        match &self.admin_token {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(presented.as_bytes())),
            None => false,
        }
    }
}

/// Guards the admin routes with `Authorization: Bearer <token>`.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| state.is_admin(token.trim()));

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(CacheError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Handler for GET /admin/cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStatsReport> {
    Json(state.cache.stats())
}

/// Handler for POST /admin/cache/clear
///
/// An empty pattern clears the whole cache.
pub async fn clear_handler(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<ClearResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    if req.clears_everything() {
        warn!("Admin requested a full cache clear");
    }

    let removed = state.cache.clear_pattern(&req.pattern).await;
    info!(pattern = %req.pattern, removed, "Cache cleared by admin");

    Ok(Json(ClearResponse::new(req.pattern, removed)))
}

/// Handler for DELETE /admin/cache/keys/*key
pub async fn delete_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        )));
    }

    state.cache.delete(&key).await;
    info!(%key, "Key deleted by admin");

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /health
///
/// Reports healthy regardless of the shared tier; its state is informational.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.cache.stats();
    Json(HealthResponse::healthy(
        stats.backend,
        stats.remote.map(|remote| remote.availability),
    ))
}
