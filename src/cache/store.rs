//! Cache Store Module
//!
//! Single-process cache engine: a map of entries, LRU ordering for capacity
//! eviction and an expiry heap for TTL sweeps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, ExpiryHeap, LruTracker, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

/// Stale heap marks tolerated before the heap is rebuilt.
const HEAP_SLACK: usize = 64;

// == Expiring Store ==
/// Key/value store with per-entry TTL and LRU eviction.
///
/// Not synchronized; wrap it in [`LocalCache`](crate::cache::LocalCache) to
/// share it.
#[derive(Debug)]
pub struct ExpiringStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Deadlines of entries with a TTL
    expiry: ExpiryHeap,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    next_generation: u64,
}

impl<V: Clone> ExpiringStore<V> {
    // == Constructor ==
    /// Creates a new store holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            expiry: ExpiryHeap::new(),
            stats: CacheStats::new(),
            max_size,
            next_generation: 0,
        }
    }

    // == Put ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// If the key already exists, the value is overwritten and TTL is reset.
    /// A `None` TTL never expires. If the cache is at capacity, expired
    /// entries are swept first, then the least recently used entry is evicted.
    pub fn put(&mut self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let is_overwrite = self.entries.contains_key(key);

        if !is_overwrite && self.entries.len() >= self.max_size {
            self.evict_expired();
        }

        if !is_overwrite && self.entries.len() >= self.max_size {
            match self.lru.evict_oldest() {
                Some(evicted_key) => {
                    self.entries.remove(&evicted_key);
                    self.stats.record_eviction();
                    debug!(key = %evicted_key, "Evicted least recently used entry");
                }
                None => {
                    return Err(CacheError::CacheFull(
                        "Cache is full and eviction failed".to_string(),
                    ));
                }
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let entry = CacheEntry::new(value, ttl).with_generation(generation);
        if let Some(expires_at) = entry.expires_at {
            self.expiry.push(key, generation, expires_at);
        }
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);

        self.compact_expiry();
        self.stats.set_total_entries(self.entries.len());

        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries found here are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_with_ttl(key).map(|(value, _)| value)
    }

    /// [`get`](Self::get) that also reports the entry's remaining TTL.
    pub fn get_with_ttl(&mut self, key: &str) -> Option<(V, Option<Duration>)> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.drop_entry(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.ttl_remaining()))
    }

    /// True if `key` holds a live value. Does not touch LRU order or stats.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Remaining TTL of a live entry; `Some(None)` means it never expires.
    pub fn ttl_remaining(&self, key: &str) -> Option<Option<Duration>> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(CacheEntry::ttl_remaining)
    }

    // == Remove ==
    /// Removes an entry by key, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.drop_entry(key);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Clear ==
    /// Drops every entry and resets ordering structures. Stats are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.expiry.clear();
        self.stats.set_total_entries(0);
    }

    // == Evict Expired ==
    /// Removes all entries whose TTL has elapsed, read or not.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        while let Some((key, generation)) = self.expiry.pop_due(now) {
            let live = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.generation == generation);
            if live {
                self.drop_entry(&key);
                removed += 1;
            }
        }

        self.stats.record_expirations(removed as u64);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Zeroes the cumulative counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys currently held, expired-but-unswept ones included.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of marks in the expiry heap, stale ones included.
    pub fn pending_expiry_marks(&self) -> usize {
        self.expiry.len()
    }

    fn drop_entry(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.lru.remove(key);
            true
        } else {
            false
        }
    }

    /// Rebuilds the heap once stale marks clearly outnumber live ones.
    fn compact_expiry(&mut self) {
        if self.expiry.len() <= self.entries.len() * 2 + HEAP_SLACK {
            return;
        }
        let entries = &self.entries;
        self.expiry.retain(|key, generation| {
            entries
                .get(key)
                .is_some_and(|entry| entry.generation == generation)
        });
    }
}
