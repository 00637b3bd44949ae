//! Cache Warmer Module
//!
//! Counts accesses per key and reloads the hottest keys on demand. Nothing
//! here schedules itself; an outside scheduler calls [`CacheWarmer::warm_cache`].

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;

/// Default number of keys reloaded per warming pass.
pub const DEFAULT_WARM_TOP_N: usize = 100;

// == Warm Report ==
/// Outcome of one warming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Keys handed to the loader
    pub attempted: usize,
    /// Keys stored back into the cache
    pub loaded: usize,
    /// Keys the loader had no value for
    pub skipped: usize,
    /// Keys whose load or store failed
    pub failed: usize,
}

// == Cache Warmer ==
#[derive(Debug)]
pub struct CacheWarmer {
    access_counts: Mutex<HashMap<String, u64>>,
    top_n: usize,
    warm_ttl: Option<Duration>,
    warm_loads: AtomicU64,
}

impl Default for CacheWarmer {
    fn default() -> Self {
        Self::new(DEFAULT_WARM_TOP_N)
    }
}

impl CacheWarmer {
    pub fn new(top_n: usize) -> Self {
        Self {
            access_counts: Mutex::new(HashMap::new()),
            top_n,
            warm_ttl: None,
            warm_loads: AtomicU64::new(0),
        }
    }

    /// TTL applied to warmed values. Defaults to no expiry.
    pub fn with_warm_ttl(mut self, ttl: Duration) -> Self {
        self.warm_ttl = Some(ttl);
        self
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    // == Record Access ==
    pub fn record_access(&self, key: &str) {
        let mut counts = self.access_counts.lock();
        match counts.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                counts.insert(key.to_string(), 1);
            }
        }
    }

    pub fn access_count(&self, key: &str) -> u64 {
        self.access_counts.lock().get(key).copied().unwrap_or(0)
    }

    pub fn tracked_keys(&self) -> usize {
        self.access_counts.lock().len()
    }

    // == Hot Keys ==
    /// The `limit` most accessed keys, hottest first. Equal counts are
    /// ordered by key so the selection is deterministic.
    pub fn hot_keys(&self, limit: usize) -> Vec<String> {
        let counts = self.access_counts.lock();
        let mut ranked: Vec<(&String, u64)> =
            counts.iter().map(|(key, count)| (key, *count)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Forgets every key outside the `keep` hottest.
    pub fn prune(&self, keep: usize) -> usize {
        let survivors: HashSet<String> = self.hot_keys(keep).into_iter().collect();
        let mut counts = self.access_counts.lock();
        let before = counts.len();
        counts.retain(|key, _| survivors.contains(key));
        before - counts.len()
    }

    pub fn warm_loads(&self) -> u64 {
        self.warm_loads.load(Ordering::Relaxed)
    }

    pub fn reset_warm_loads(&self) {
        self.warm_loads.store(0, Ordering::Relaxed);
    }

    // == Warm Cache ==
    /// Reloads the hottest keys into `cache` through `loader`.
    ///
    /// A failing key is logged and skipped; the rest of the batch still runs.
    pub async fn warm_cache<V, C, F, Fut, E>(&self, cache: &C, loader: F) -> WarmReport
    where
        V: Send + 'static,
        C: CacheLayer<V> + ?Sized,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        E: Display,
    {
        let keys = self.hot_keys(self.top_n);
        let mut report = WarmReport {
            attempted: keys.len(),
            ..WarmReport::default()
        };

        for key in keys {
            match loader(key.clone()).await {
                Ok(Some(value)) => match cache.put(&key, value, self.warm_ttl).await {
                    Ok(()) => {
                        self.warm_loads.fetch_add(1, Ordering::Relaxed);
                        report.loaded += 1;
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "Failed to store warmed value");
                        report.failed += 1;
                    }
                },
                Ok(None) => {
                    debug!(key = %key, "Loader had no value for hot key");
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Cache warming load failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            loaded = report.loaded,
            failed = report.failed,
            "Cache warming pass complete"
        );
        report
    }
}
