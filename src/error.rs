//! Error types for the cache service
//!
//! Provides unified error handling using thiserror. Errors raised inside the
//! cache tiers never reach request handlers; only the admin surface and
//! startup code surface a `CacheError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache service.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Shared tier refused, timed out or failed a command
    #[error("Remote cache unavailable: {0}")]
    Remote(#[from] redis::RedisError),

    /// Value could not be encoded for (or decoded from) the shared tier
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote connection parameters are unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or wrong admin credential
    #[error("Unauthorized")]
    Unauthorized,
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Unauthorized => StatusCode::UNAUTHORIZED,
            CacheError::Remote(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) | CacheError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache service.
pub type Result<T> = std::result::Result<T, CacheError>;
