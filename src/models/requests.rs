//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::MAX_KEY_LENGTH;

/// Request body for `POST /admin/cache/clear`
///
/// `pattern` has no default: clearing everything takes an explicit `""`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearRequest {
    /// Substring matched against keys; empty clears every key
    pub pattern: String,
}

impl ClearRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Pattern exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }

    pub fn clears_everything(&self) -> bool {
        self.pattern.is_empty()
    }
}
