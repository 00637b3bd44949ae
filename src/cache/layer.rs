//! Cache Layer Module
//!
//! The capability every cache level exposes, and the in-process (L1)
//! implementation of it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::{CacheStats, ExpiringStore};
use crate::error::Result;

// == Cache Layer Trait ==
/// A level of the cache hierarchy.
///
/// `get` yields `Ok(None)` for a miss; `Err` is reserved for the layer itself
/// failing (e.g. a remote store being unreachable).
#[async_trait]
pub trait CacheLayer<V: Send + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// `get` plus the remaining TTL of the value, `None` when the layer
    /// cannot tell or the value never expires.
    async fn get_with_ttl(&self, key: &str) -> Result<Option<(V, Option<Duration>)>> {
        Ok(self.get(key).await?.map(|value| (value, None)))
    }

    /// Inserts or overwrites `key`. `None` TTL means no expiry.
    async fn put(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()>;

    /// Returns whether the key was present.
    async fn remove(&self, key: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

// == Local Cache ==
/// An [`ExpiringStore`] behind one lock, shareable across tasks.
///
/// A read reorders the LRU and bumps stats, so every operation takes the
/// lock exclusively.
#[derive(Debug)]
pub struct LocalCache<V> {
    store: Mutex<ExpiringStore<V>>,
}

impl<V: Clone + Send> LocalCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self::from_store(ExpiringStore::new(max_size))
    }

    pub fn from_store(store: ExpiringStore<V>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats()
    }

    pub async fn reset_stats(&self) {
        self.store.lock().await.reset_stats();
    }

    /// Sweeps expired entries; returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        self.store.lock().await.evict_expired()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.store.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }
}

#[async_trait]
impl<V> CacheLayer<V> for LocalCache<V>
where
    V: Clone + Send + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.store.lock().await.get(key))
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<(V, Option<Duration>)>> {
        Ok(self.store.lock().await.get_with_ttl(key))
    }

    async fn put(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        self.store.lock().await.put(key, value, ttl)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.store.lock().await.remove(key))
    }

    async fn clear(&self) -> Result<()> {
        self.store.lock().await.clear();
        Ok(())
    }
}
