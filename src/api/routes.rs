//! API Routes
//!
//! Configures the Axum router for the admin and health endpoints.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_key_handler, health_handler, require_admin, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Liveness plus shared tier state
/// - `GET /admin/cache/stats` - Cache statistics
/// - `POST /admin/cache/clear` - Pattern clear, `""` clears everything
/// - `DELETE /admin/cache/keys/*key` - Single-key delete
///
/// Everything under `/admin` requires the bearer admin token.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/admin/cache/stats", get(stats_handler))
        .route("/admin/cache/clear", post(clear_handler))
        .route("/admin/cache/keys/*key", delete(delete_key_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health_handler))
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
