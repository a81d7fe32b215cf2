//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::Availability;

/// Response body for `POST /admin/cache/clear`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub pattern: String,
    /// Entries removed across tiers
    pub removed: u64,
}

impl ClearResponse {
    pub fn new(pattern: impl Into<String>, removed: u64) -> Self {
        let pattern = pattern.into();
        let message = if pattern.is_empty() {
            format!("Cleared entire cache ({} entries)", removed)
        } else {
            format!("Cleared {} entries matching '{}'", removed, pattern)
        };
        Self {
            message,
            pattern,
            removed,
        }
    }
}

/// Response body for `DELETE /admin/cache/keys/*key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted", key),
            key,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy": the service answers even with the shared tier down
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// `"tiered"` or `"local"`
    pub backend: &'static str,
    /// Shared tier reachability, absent for the local-only backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Availability>,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(backend: &'static str, remote: Option<Availability>) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend,
            remote,
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
