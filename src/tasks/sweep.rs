//! Expired Entry Sweep
//!
//! Background task that periodically drops expired entries from the
//! in-process tier. Reads already ignore expired entries; the sweep only
//! returns their memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheLayer;

/// Spawns the sweep loop.
///
/// Returns the task's JoinHandle so it can be aborted during graceful
/// shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(cache.clone(), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task(cache: Arc<dyn CacheLayer>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs, "Starting expired entry sweep");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired();
            if removed > 0 {
                info!(removed, "Sweep removed expired entries");
            } else {
                debug!("Sweep found no expired entries");
            }
        }
    })
}
