//! Cache key construction.
//!
//! Keys have the shape `version:namespace:identifier[:q=queryHash][:u=caller]`.
//! The query hash is the first 8 hex characters of a SHA-256 over the
//! canonical (sorted) query string, so it is stable across restarts.
//!
//! `%` and `:` inside the identifier and caller are percent-encoded, so the
//! only bare colons in a key are separators and no identifier can spell out
//! another key's optional segments.

use std::borrow::Cow;
use std::fmt;

use sha2::{Digest, Sha256};

/// Logical grouping of keys by content type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(Cow<'static, str>);

impl Namespace {
    /// Aggregated statistics (view counts, tag counts).
    pub const STATS: Namespace = Namespace(Cow::Borrowed("stats"));
    /// Paginated content lists.
    pub const LIST: Namespace = Namespace(Cow::Borrowed("list"));
    /// RSS/Atom output.
    pub const FEED: Namespace = Namespace(Cow::Borrowed("feed"));
    /// Individual stories.
    pub const STORY: Namespace = Namespace(Cow::Borrowed("story"));

    pub fn new(name: impl Into<String>) -> Self {
        Namespace(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional discriminators appended after the identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyOptions<'a> {
    /// Raw query string, without the leading `?`
    pub query: Option<&'a str>,
    /// Identity of the caller, appended as `u=<caller>`
    pub caller_segment: Option<&'a str>,
}

/// Builds keys under one version token.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    version: String,
}

impl KeyBuilder {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Builds the key for `identifier` in `namespace`.
    pub fn build(&self, namespace: &Namespace, identifier: &str, options: &KeyOptions<'_>) -> String {
        let mut key = self.base(namespace, identifier);

        if let Some(hash) = options.query.and_then(query_hash) {
            key.push_str(":q=");
            key.push_str(&hash);
        }

        if let Some(caller) = options.caller_segment {
            key.push_str(":u=");
            key.push_str(&escape_segment(caller));
        }

        key
    }

    /// Substring shared by every query and caller variant of `identifier`,
    /// but not by the plain key or by any other identifier.
    pub fn variants_pattern(&self, namespace: &Namespace, identifier: &str) -> String {
        format!("{}:", self.base(namespace, identifier))
    }

    /// Prefix shared by every key of `namespace`; used for invalidation.
    pub fn namespace_prefix(&self, namespace: &Namespace) -> String {
        format!("{}:{}:", self.version, namespace)
    }

    fn base(&self, namespace: &Namespace, identifier: &str) -> String {
        format!("{}:{}:{}", self.version, namespace, escape_segment(identifier))
    }
}

fn escape_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains(['%', ':']) {
        Cow::Owned(segment.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Sorts the `&`-separated pairs of a query string and drops empty ones.
pub fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_unstable();
    pairs.join("&")
}

/// First 8 hex characters of the SHA-256 of the canonical query, or `None`
/// when the query is empty after canonicalisation.
pub fn query_hash(query: &str) -> Option<String> {
    let canonical = canonical_query(query);
    if canonical.is_empty() {
        return None;
    }
    let digest = Sha256::digest(canonical.as_bytes());
    Some(hex::encode(&digest[..4]))
}
