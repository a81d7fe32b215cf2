//! Cache Entry Module
//!
//! Defines a single cached value with its storage and expiry timestamps. The
//! same structure is the JSON envelope written to the shared tier.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Storage timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stored at `now_ms` that lives for `ttl`.
    pub fn new(value: Value, now_ms: u64, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: now_ms,
            expires_at: now_ms.saturating_add(ttl.as_millis() as u64),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `now_ms >= expires_at`, so a zero TTL is
    /// expired the moment it is created.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    // == Envelope ==
    /// Encodes the entry as the JSON payload stored in the shared tier.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a payload read back from the shared tier.
    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    // == Time To Live ==
    /// Remaining lifetime, zero once expired.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now_ms))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(json!("test_value"), 1_000, Duration::from_secs(60));
        assert_eq!(entry.value, json!("test_value"));
        assert_eq!(entry.stored_at, 1_000);
        assert_eq!(entry.expires_at, 61_000);
        assert!(!entry.is_expired(1_000));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(json!(1), 5_000, Duration::from_secs(1));
        assert!(!entry.is_expired(5_999));
        assert!(entry.is_expired(6_000), "Entry should be expired at boundary");
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let entry = CacheEntry::new(json!("<xml/>"), 5_000, Duration::ZERO);
        assert!(entry.is_expired(5_000));
    }

    #[test]
    fn test_remaining() {
        let entry = CacheEntry::new(json!(null), 0, Duration::from_secs(10));
        assert_eq!(entry.remaining(4_000), Duration::from_secs(6));
        assert_eq!(entry.remaining(20_000), Duration::ZERO);
    }

    #[test]
    fn test_envelope_json_shape() {
        let entry = CacheEntry::new(json!({"title": "Hi"}), 10, Duration::from_millis(5));
        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            encoded,
            json!({"value": {"title": "Hi"}, "stored_at": 10, "expires_at": 15})
        );
    }

    #[test]
    fn test_garbled_payload_is_a_serialization_error() {
        let err = CacheEntry::from_payload("{not json").unwrap_err();
        assert!(matches!(err, crate::error::CacheError::Serialization(_)));

        let entry = CacheEntry::new(json!([1, 2]), 0, Duration::from_secs(1));
        let decoded = CacheEntry::from_payload(&entry.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }
}
