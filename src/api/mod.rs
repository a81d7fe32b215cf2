//! API Module
//!
//! Admin surface of the cache service.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /admin/cache/stats` - Cache statistics
//! - `POST /admin/cache/clear` - Clear keys matching a pattern
//! - `DELETE /admin/cache/keys/*key` - Delete one key

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
