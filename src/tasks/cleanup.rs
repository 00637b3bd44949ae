//! TTL Cleanup Task
//!
//! Background task that periodically removes expired L1 entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MultiLevelCache;

/// Spawns a background task that sweeps expired entries every
/// `cleanup_interval_secs` seconds.
///
/// Returns the task's handle so shutdown can abort it.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(MultiLevelCache::<String>::new(1000));
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V>(
    cache: Arc<MultiLevelCache<V>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting TTL cleanup task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.evict_expired().await;

            if removed > 0 {
                info!(removed, "TTL cleanup: removed expired entries");
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
