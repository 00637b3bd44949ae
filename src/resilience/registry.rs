//! Circuit breaker registry
//!
//! Named breakers, created on first use and kept for the life of the
//! registry, plus [`CircuitProtected`], which routes every call of a wrapped
//! operation through the breaker registered under its name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::CircuitError;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};

// == Registry ==
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    circuits: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose [`circuit`](Self::circuit) lookups create breakers with `config`.
    pub fn with_default_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            default_config: config,
        }
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    // == Get Circuit ==
    /// Returns the breaker named `name`, creating it with `config` if absent.
    ///
    /// The first registration wins; `config` is ignored for existing names.
    pub fn get_circuit(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut circuits = self.circuits.lock();
        if let Some(existing) = circuits.get(name) {
            return existing.clone();
        }

        debug!(circuit = name, "Registering circuit breaker");
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        circuits.insert(name.to_string(), breaker.clone());
        breaker
    }

    /// [`get_circuit`](Self::get_circuit) with the registry's default config.
    pub fn circuit(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_circuit(name, self.default_config.clone())
    }

    /// Looks up a breaker without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.circuits.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.lock().is_empty()
    }

    /// Snapshot of every breaker, sorted by name.
    pub fn metrics(&self) -> Vec<CircuitBreakerMetrics> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.circuits.lock().values().cloned().collect();
        let mut metrics: Vec<CircuitBreakerMetrics> =
            breakers.iter().map(|breaker| breaker.metrics()).collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        metrics
    }

    // == Reset All ==
    /// Operator recovery: every breaker back to Closed with zeroed stats.
    /// Breakers stay registered.
    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.circuits.lock().values().cloned().collect();
        for breaker in &breakers {
            breaker.reset();
        }
        info!(count = breakers.len(), "Reset all circuit breakers");
    }

    /// Wraps `operation` so every call goes through the breaker named `name`.
    pub fn protect<F>(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        operation: F,
    ) -> CircuitProtected<F> {
        CircuitProtected::new(self.clone(), name, config, operation)
    }
}

// == Circuit Protected ==
/// An operation bound to a named breaker.
///
/// The breaker is resolved through the registry on every call, so the
/// wrapper and any other user of the same name share state.
pub struct CircuitProtected<F> {
    registry: Arc<CircuitBreakerRegistry>,
    name: String,
    config: CircuitBreakerConfig,
    operation: F,
}

impl<F> CircuitProtected<F> {
    pub fn new(
        registry: Arc<CircuitBreakerRegistry>,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        operation: F,
    ) -> Self {
        Self {
            registry,
            name: name.into(),
            config,
            operation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn circuit(&self) -> Arc<CircuitBreaker> {
        self.registry.get_circuit(&self.name, self.config.clone())
    }

    /// Invokes the wrapped operation with `args` through the breaker.
    pub async fn call<A, Fut, T, E>(&self, args: A) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.circuit();
        breaker.execute(|| (self.operation)(args)).await
    }
}
