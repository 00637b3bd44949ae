//! Resilient Cache - layered caching and circuit breaking
//!
//! A TTL/LRU in-process cache with an optional remote layer and
//! access-driven warming, plus circuit breakers and adaptive backoff for
//! protecting calls to flaky upstream services.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
