//! Resilience Module
//!
//! Circuit breakers for external dependencies, a registry that shares them
//! by name, and adaptive backoff for retries.

mod backoff;
mod circuit_breaker;
mod registry;

pub use backoff::{AdaptiveBackoff, BackoffConfig, OutcomeCounts};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use registry::{CircuitBreakerRegistry, CircuitProtected};
