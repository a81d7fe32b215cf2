//! Shared Remote Layer
//!
//! The out-of-process tier: a `RemoteStore` seam, the Redis implementation
//! behind it, and the availability state the tiered manager consults before
//! every remote call.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{CacheError, Result};

/// Backoff before the first retry after a failure.
const RETRY_BASE: Duration = Duration::from_millis(500);
/// Upper bound on the wait between retries.
const RETRY_CAP: Duration = Duration::from_secs(30);
/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 100;

// == Remote Store Seam ==
/// Operations the tiered manager needs from the shared key-value service.
///
/// Payloads are opaque strings; the manager owns their encoding.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every key containing `substring`; empty means every key this
    /// store owns. Returns the number of keys removed.
    async fn delete_matching(&self, substring: &str) -> Result<u64>;
}

// == Availability ==
/// Reachability of the shared tier as inferred from real traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug)]
struct TrackerState {
    availability: Availability,
    consecutive_failures: u32,
    retry_at_ms: u64,
}

/// `Unknown -> Available` on a successful connect or operation,
/// `Available -> Unavailable` on any error, `Unavailable -> Available` on the
/// next success. While unavailable, attempts are spaced by a capped
/// exponential backoff.
#[derive(Debug)]
pub struct AvailabilityTracker {
    state: Mutex<TrackerState>,
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                availability: Availability::Unknown,
                consecutive_failures: 0,
                retry_at_ms: 0,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Availability {
        self.state().availability
    }

    /// Whether a remote call may be made at `now_ms`.
    ///
    /// While unavailable, the first caller after the backoff window claims
    /// the retry and pushes the window forward; everyone else keeps skipping
    /// the remote tier until that attempt reports back.
    pub fn should_attempt(&self, now_ms: u64) -> bool {
        let mut state = self.state();
        match state.availability {
            Availability::Unknown | Availability::Available => true,
            Availability::Unavailable if now_ms >= state.retry_at_ms => {
                let delay = retry_delay(state.consecutive_failures);
                state.retry_at_ms = now_ms.saturating_add(delay.as_millis() as u64);
                true
            }
            Availability::Unavailable => false,
        }
    }

    /// Records a successful call; returns the state it left.
    pub fn mark_success(&self) -> Availability {
        let mut state = self.state();
        let previous = state.availability;
        state.availability = Availability::Available;
        state.consecutive_failures = 0;
        state.retry_at_ms = 0;
        previous
    }

    /// Records a failed call at `now_ms`; returns the state it left.
    pub fn mark_failure(&self, now_ms: u64) -> Availability {
        let mut state = self.state();
        let previous = state.availability;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.availability = Availability::Unavailable;
        state.retry_at_ms = now_ms.saturating_add(retry_delay(state.consecutive_failures).as_millis() as u64);
        previous
    }
}

/// Delay before the next attempt after `failures` consecutive failures.
pub fn retry_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    RETRY_BASE.saturating_mul(1 << exponent).min(RETRY_CAP)
}

// == Redis Store ==
/// `RemoteStore` backed by Redis through a reconnecting `ConnectionManager`.
pub struct RedisStore {
    client: redis::Client,
    connection: tokio::sync::Mutex<Option<ConnectionManager>>,
    key_prefix: String,
}

impl RedisStore {
    /// Opens a client for `config`. No network traffic happens until the
    /// first command.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let url = connection_url(config)?;
        let client = redis::Client::open(url.as_str())?;
        Ok(Self {
            client,
            connection: tokio::sync::Mutex::new(None),
            key_prefix: config.key_prefix.clone(),
        })
    }

    async fn conn(&self) -> Result<ConnectionManager> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = ConnectionManager::new_with_config(self.client.clone(), manager_config()).await?;
        info!("Connected to remote cache");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(payload)
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let _: () = conn.pset_ex(self.full_key(key), payload, ttl_ms).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(self.full_key(key)).await?;
        Ok(())
    }

    async fn delete_matching(&self, substring: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let pattern = scan_pattern(&self.key_prefix, substring);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: i64 = conn.del(&keys).await?;
                total_deleted += deleted.max(0) as u64;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = total_deleted, "remote pattern delete");
        Ok(total_deleted)
    }
}

fn manager_config() -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_exponent_base(2)
        .set_factor(100)
        .set_max_delay(RETRY_CAP.as_millis() as u64)
        .set_number_of_retries(3)
        .set_connection_timeout(Duration::from_secs(2))
        .set_response_timeout(Duration::from_secs(1))
}

/// Builds `redis://[:password@]host:port/db` with the password percent-encoded.
pub fn connection_url(config: &RemoteConfig) -> Result<Url> {
    let invalid = |what: &str| CacheError::Config(format!("invalid redis {what}"));

    let mut url = Url::parse("redis://localhost").map_err(|_| invalid("url"))?;
    url.set_host(Some(&config.host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(config.port)).map_err(|_| invalid("port"))?;
    if let Some(password) = &config.password {
        url.set_password(Some(password)).map_err(|_| invalid("password"))?;
    }
    url.set_path(&format!("/{}", config.db));
    Ok(url)
}

/// SCAN `MATCH` pattern selecting prefixed keys that contain `substring`.
pub fn scan_pattern(prefix: &str, substring: &str) -> String {
    if substring.is_empty() {
        format!("{}*", escape_glob(prefix))
    } else {
        format!("{}*{}*", escape_glob(prefix), escape_glob(substring))
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
