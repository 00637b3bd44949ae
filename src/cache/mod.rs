//! Cache Module
//!
//! Layered caching: a TTL/LRU in-process store (L1), an optional remote
//! layer (L2), access-driven warming, and the multi-level façade over them.

mod distributed;
mod entry;
mod expiry;
mod layer;
mod lru;
mod multi_level;
mod stats;
mod store;
mod warmer;


// Re-export public types
pub use distributed::{DistributedCache, InMemoryRemote, RemoteStore};
pub use entry::CacheEntry;
pub use expiry::ExpiryHeap;
pub use layer::{CacheLayer, LocalCache};
pub use lru::LruTracker;
pub use multi_level::{MultiLevelCache, DEFAULT_PROMOTION_TTL};
pub use stats::CacheStats;
pub use store::ExpiringStore;
pub use warmer::{CacheWarmer, WarmReport, DEFAULT_WARM_TOP_N};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes for the operator API
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
