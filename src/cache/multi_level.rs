//! Multi-Level Cache Module
//!
//! L1 (in-process) in front of an optional L2, with access tracking for
//! warming. Reads fall through L1 -> L2 and promote L2 hits; writes go to L1
//! first and are then mirrored to L2.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, CacheStats, CacheWarmer, LocalCache, WarmReport};
use crate::error::{FetchError, Result};
use crate::resilience::CircuitBreaker;

/// TTL given to values promoted from L2 into L1.
pub const DEFAULT_PROMOTION_TTL: Duration = Duration::from_secs(300);

// == Multi-Level Cache ==
pub struct MultiLevelCache<V> {
    l1: LocalCache<V>,
    l2: Option<Arc<dyn CacheLayer<V>>>,
    warmer: CacheWarmer,
    promotion_ttl: Option<Duration>,
    l2_hits: AtomicU64,
}

impl<V> MultiLevelCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// L1-only cache holding at most `l1_max_size` entries.
    pub fn new(l1_max_size: usize) -> Self {
        Self {
            l1: LocalCache::new(l1_max_size),
            l2: None,
            warmer: CacheWarmer::default(),
            promotion_ttl: Some(DEFAULT_PROMOTION_TTL),
            l2_hits: AtomicU64::new(0),
        }
    }

    pub fn with_l2(mut self, l2: Arc<dyn CacheLayer<V>>) -> Self {
        self.l2 = Some(l2);
        self
    }

    pub fn with_warmer(mut self, warmer: CacheWarmer) -> Self {
        self.warmer = warmer;
        self
    }

    /// Upper bound on the L1 TTL of promoted L2 hits; `None` leaves only the
    /// L2 entry's own remaining TTL.
    pub fn with_promotion_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.promotion_ttl = ttl;
        self
    }

    pub fn has_l2(&self) -> bool {
        self.l2.is_some()
    }

    pub fn warmer(&self) -> &CacheWarmer {
        &self.warmer
    }

    /// L1 counters plus L2 hits and the warmer's load count.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.l1.stats().await;
        stats.l2_hits = self.l2_hits.load(Ordering::Relaxed);
        stats.warm_loads = self.warmer.warm_loads();
        stats
    }

    /// Operator reset of all cumulative counters.
    pub async fn reset_stats(&self) {
        self.l1.reset_stats().await;
        self.l2_hits.store(0, Ordering::Relaxed);
        self.warmer.reset_warm_loads();
    }

    /// Sweeps expired L1 entries.
    pub async fn evict_expired(&self) -> usize {
        self.l1.evict_expired().await
    }

    pub async fn len(&self) -> usize {
        self.l1.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.l1.is_empty().await
    }

    /// L1 lifetime of a promoted value: never longer than what L2 has left.
    fn promotion_ttl_for(&self, remaining: Option<Duration>) -> Option<Duration> {
        match (remaining, self.promotion_ttl) {
            (Some(left), Some(cap)) => Some(left.min(cap)),
            (Some(left), None) => Some(left),
            (None, cap) => cap,
        }
    }

    // == Warm ==
    /// Reloads the most accessed keys through `loader`.
    pub async fn warm<F, Fut, E>(&self, loader: F) -> WarmReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Display,
    {
        self.warmer.warm_cache(self, loader).await
    }

    // == Get Or Fetch ==
    /// Returns the cached value, or fetches it through `breaker` and caches it.
    ///
    /// Concurrent misses on the same key may each call `fetch`. A failed
    /// write-back is logged; the fetched value is still returned.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        breaker: &CircuitBreaker,
        fetch: F,
    ) -> std::result::Result<V, FetchError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = breaker.execute(fetch).await?;

        if let Err(err) = self.put(key, value.clone(), ttl).await {
            warn!(key, error = %err, "Failed to cache fetched value");
        }
        Ok(value)
    }
}

#[async_trait]
impl<V> CacheLayer<V> for MultiLevelCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        if let Some(value) = self.l1.get(key).await? {
            self.warmer.record_access(key);
            return Ok(Some(value));
        }

        let Some(l2) = &self.l2 else {
            return Ok(None);
        };

        match l2.get_with_ttl(key).await {
            Ok(Some((value, remaining))) => {
                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                let ttl = self.promotion_ttl_for(remaining);
                if let Err(err) = self.l1.put(key, value.clone(), ttl).await {
                    warn!(key, error = %err, "Failed to promote L2 hit into L1");
                } else {
                    debug!(key, "Promoted L2 hit into L1");
                }
                self.warmer.record_access(key);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(key, error = %err, "L2 read failed, treating as miss");
                Ok(None)
            }
        }
    }

    /// Writes L1, then L2. An L2 failure is returned to the caller while L1
    /// keeps the new value.
    async fn put(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        match &self.l2 {
            Some(l2) => {
                self.l1.put(key, value.clone(), ttl).await?;
                l2.put(key, value, ttl).await.map_err(|err| {
                    warn!(key, error = %err, "L2 write failed, L1 holds the newer value");
                    err
                })
            }
            None => self.l1.put(key, value, ttl).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let l1 = self.l1.remove(key).await;
        let l2 = match &self.l2 {
            Some(l2) => l2.remove(key).await,
            None => Ok(false),
        };
        Ok(l1? | l2?)
    }

    async fn clear(&self) -> Result<()> {
        let l1 = self.l1.clear().await;
        let l2 = match &self.l2 {
            Some(l2) => l2.clear().await,
            None => Ok(()),
        };
        l1.and(l2)
    }
}
