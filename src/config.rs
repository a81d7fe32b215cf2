//! Configuration Module
//!
//! Handles loading service configuration from environment variables. The TTL
//! policy table is built once here and never changes afterwards.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::Namespace;

// == TTL Policy ==
/// Namespace to TTL mapping, with a fallback for namespaces not in the table.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default: Duration,
    table: HashMap<Namespace, Duration>,
}

impl TtlPolicy {
    /// Creates an empty policy where every namespace gets `default`.
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            table: HashMap::new(),
        }
    }

    /// Returns the policy with `namespace` mapped to `ttl`.
    pub fn with(mut self, namespace: Namespace, ttl: Duration) -> Self {
        self.table.insert(namespace, ttl);
        self
    }

    /// Resolves the TTL for a namespace.
    pub fn ttl_for(&self, namespace: &Namespace) -> Duration {
        self.table.get(namespace).copied().unwrap_or(self.default)
    }
}

impl Default for TtlPolicy {
    /// Aggregated statistics live minutes, list and feed views tens of
    /// minutes, individual stories a day.
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
            .with(Namespace::STATS, Duration::from_secs(300))
            .with(Namespace::LIST, Duration::from_secs(1800))
            .with(Namespace::FEED, Duration::from_secs(1800))
            .with(Namespace::STORY, Duration::from_secs(86_400))
    }
}

// == Remote Tier Parameters ==
/// Connection parameters for the shared Redis tier.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Prepended to every key written to Redis
    pub key_prefix: String,
    /// Logical database index
    pub db: i64,
}

impl RemoteConfig {
    /// Parameters for a server on `host` with every other field defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 6379,
            password: None,
            key_prefix: "blog:".to_string(),
            db: 0,
        }
    }
}

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of keys held by the in-process tier
    pub local_max_keys: usize,
    /// Background sweep interval in seconds
    pub sweep_interval: u64,
    /// TTL in seconds for values promoted from the shared tier
    pub promotion_ttl: u64,
    /// Leading key segment; bump to orphan the whole key-space
    pub cache_version: String,
    pub ttl_policy: TtlPolicy,
    /// `None` selects the local-only backend
    pub remote: Option<RemoteConfig>,
    /// Bearer token for the admin routes; `None` locks them
    pub admin_token: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` (3000), `LOCAL_MAX_KEYS` (1000), `SWEEP_INTERVAL` (60),
    ///   `PROMOTION_TTL` (60), `CACHE_VERSION` (v1)
    /// - `DEFAULT_TTL` (600), `TTL_STATS` (300), `TTL_LIST` (1800),
    ///   `TTL_FEED` (1800), `TTL_STORY` (86400)
    /// - `REDIS_HOST` (unset = local-only), `REDIS_PORT` (6379),
    ///   `REDIS_PASSWORD`, `REDIS_KEY_PREFIX` (blog:), `REDIS_DB` (0)
    /// - `ADMIN_TOKEN`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let policy_defaults = TtlPolicy::default();
        let ttl = |name: &str, namespace: &Namespace| {
            Duration::from_secs(env_or(name, policy_defaults.ttl_for(namespace).as_secs()))
        };

        let ttl_policy = TtlPolicy::new(Duration::from_secs(env_or("DEFAULT_TTL", 600)))
            .with(Namespace::STATS, ttl("TTL_STATS", &Namespace::STATS))
            .with(Namespace::LIST, ttl("TTL_LIST", &Namespace::LIST))
            .with(Namespace::FEED, ttl("TTL_FEED", &Namespace::FEED))
            .with(Namespace::STORY, ttl("TTL_STORY", &Namespace::STORY));

        let remote = non_empty_var("REDIS_HOST").map(|host| {
            let base = RemoteConfig::new(host);
            RemoteConfig {
                port: env_or("REDIS_PORT", base.port),
                password: non_empty_var("REDIS_PASSWORD"),
                key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or(base.key_prefix),
                db: env_or("REDIS_DB", base.db),
                host: base.host,
            }
        });

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            local_max_keys: env_or("LOCAL_MAX_KEYS", defaults.local_max_keys),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            promotion_ttl: env_or("PROMOTION_TTL", defaults.promotion_ttl),
            cache_version: non_empty_var("CACHE_VERSION").unwrap_or(defaults.cache_version),
            ttl_policy,
            remote,
            admin_token: non_empty_var("ADMIN_TOKEN"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            local_max_keys: 1000,
            sweep_interval: 60,
            promotion_ttl: 60,
            cache_version: "v1".to_string(),
            ttl_policy: TtlPolicy::default(),
            remote: None,
            admin_token: None,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
