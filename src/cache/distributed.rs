//! Distributed Cache Module
//!
//! L2 layer backed by a shared remote store. Values travel as JSON bytes under
//! a namespaced key; an optional local fallback keeps reads working while the
//! remote is down.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::{CacheLayer, ExpiringStore, LocalCache};
use crate::error::{CacheError, Result};

// == Remote Store Trait ==
/// Byte-level client for a shared key/value service.
///
/// Connection lifecycle belongs to the implementation.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// `fetch` plus the key's remaining TTL. Stores that cannot report it
    /// return `None` for the TTL.
    async fn fetch_with_ttl(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Duration>)>> {
        Ok(self.fetch(key).await?.map(|payload| (payload, None)))
    }

    async fn store(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drops every key under `prefix`.
    async fn flush(&self, prefix: &str) -> Result<()>;
}

// == In-Memory Remote ==
/// Process-local [`RemoteStore`], for tests and single-node deployments.
///
/// Can be switched offline to simulate an outage.
#[derive(Debug)]
pub struct InMemoryRemote {
    entries: Mutex<ExpiringStore<Vec<u8>>>,
    available: AtomicBool,
}

impl InMemoryRemote {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(ExpiringStore::new(max_size)),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys across all namespaces.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Remote("remote store unavailable".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_available()?;
        Ok(self.entries.lock().await.get(key))
    }

    async fn fetch_with_ttl(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Duration>)>> {
        self.ensure_available()?;
        Ok(self.entries.lock().await.get_with_ttl(key))
    }

    async fn store(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_available()?;
        self.entries.lock().await.put(key, payload, ttl)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.entries.lock().await.remove(key))
    }

    async fn flush(&self, prefix: &str) -> Result<()> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        if prefix.is_empty() {
            entries.clear();
        } else {
            let doomed: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            for key in doomed {
                entries.remove(&key);
            }
        }
        Ok(())
    }
}

// == Distributed Cache ==
/// [`CacheLayer`] that delegates to a [`RemoteStore`].
pub struct DistributedCache<V> {
    remote: Arc<dyn RemoteStore>,
    namespace: String,
    fallback: Option<LocalCache<V>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> DistributedCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Creates a layer whose keys are stored as `"{namespace}:{key}"`.
    pub fn new(remote: Arc<dyn RemoteStore>, namespace: impl Into<String>) -> Self {
        Self {
            remote,
            namespace: namespace.into(),
            fallback: None,
            _value: PhantomData,
        }
    }

    /// Mirrors writes into a local store that serves reads while the remote fails.
    pub fn with_fallback(mut self, max_size: usize) -> Self {
        self.fallback = Some(LocalCache::new(max_size));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }
}

#[async_trait]
impl<V> CacheLayer<V> for DistributedCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.get_with_ttl(key).await?.map(|(value, _)| value))
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<(V, Option<Duration>)>> {
        match self.remote.fetch_with_ttl(&self.remote_key(key)).await {
            Ok(Some((payload, remaining))) => {
                Ok(Some((serde_json::from_slice(&payload)?, remaining)))
            }
            Ok(None) => Ok(None),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    warn!(key, error = %err, "Remote cache read failed, using local fallback");
                    fallback.get_with_ttl(key).await
                }
                None => Err(err),
            },
        }
    }

    async fn put(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        let payload = serde_json::to_vec(&value)?;
        let result = self.remote.store(&self.remote_key(key), payload, ttl).await;

        if let Some(fallback) = &self.fallback {
            fallback.put(key, value, ttl).await?;
        }

        result
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let remote = self.remote.delete(&self.remote_key(key)).await;
        let local = match &self.fallback {
            Some(fallback) => fallback.remove(key).await?,
            None => false,
        };
        Ok(remote? || local)
    }

    async fn clear(&self) -> Result<()> {
        let remote = self.remote.flush(&self.prefix()).await;
        if let Some(fallback) = &self.fallback {
            fallback.clear().await?;
        }
        remote
    }
}
