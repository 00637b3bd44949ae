//! API Handlers
//!
//! HTTP request handlers for the operator endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::cache::{CacheLayer, CacheWarmer, MultiLevelCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    BackoffResponse, CircuitsResponse, ClearResponse, DeleteResponse, GetResponse,
    HealthResponse, ResetResponse, SetRequest, SetResponse, StatsResponse,
};
use crate::resilience::{
    AdaptiveBackoff, CircuitBreakerMetrics, CircuitBreakerRegistry, CircuitState,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MultiLevelCache<Value>>,
    pub circuits: Arc<CircuitBreakerRegistry>,
    /// Retry delays shared by callers of upstream services
    pub backoff: Arc<AdaptiveBackoff>,
    /// TTL applied when a set request carries none
    pub default_ttl: Option<Duration>,
}

impl AppState {
    pub fn new(
        cache: MultiLevelCache<Value>,
        circuits: CircuitBreakerRegistry,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            cache: Arc::new(cache),
            circuits: Arc::new(circuits),
            backoff: Arc::new(AdaptiveBackoff::default()),
            default_ttl,
        }
    }

    pub fn with_backoff(mut self, backoff: AdaptiveBackoff) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Builds the L1 cache, warmer, circuit registry and backoff from
    /// configuration. Circuits named in the config are registered up front
    /// so they are listed before their first call.
    pub fn from_config(config: &Config) -> Self {
        let cache = MultiLevelCache::new(config.max_entries)
            .with_warmer(CacheWarmer::new(config.warm_top_n));
        let circuits = CircuitBreakerRegistry::with_default_config(config.breaker_config());
        for name in &config.circuits {
            circuits.circuit(name);
        }
        Self::new(cache, circuits, config.default_ttl())
            .with_backoff(AdaptiveBackoff::new(config.backoff_config()))
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl_or(state.default_ttl);
    state.cache.put(&req.key, req.value, ttl).await?;

    Ok(Json(SetResponse::new(req.key, ttl.map(|t| t.as_secs()))))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.cache.remove(&key).await? {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let cleared = state.cache.len().await;
    state.cache.clear().await?;
    info!(cleared, "Cache cleared by operator");

    Ok(Json(ClearResponse::new(cleared)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats().await))
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<ResetResponse> {
    state.cache.reset_stats().await;
    info!("Cache statistics reset by operator");

    Json(ResetResponse::new("Statistics reset"))
}

/// Handler for GET /circuits
pub async fn list_circuits_handler(State(state): State<AppState>) -> Json<CircuitsResponse> {
    Json(CircuitsResponse {
        circuits: state.circuits.metrics(),
    })
}

/// Handler for GET /circuits/:name
pub async fn get_circuit_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitBreakerMetrics>> {
    state
        .circuits
        .get(&name)
        .map(|breaker| Json(breaker.metrics()))
        .ok_or_else(|| CacheError::NotFound(format!("circuit {name}")))
}

/// Handler for POST /circuits/reset
pub async fn reset_circuits_handler(State(state): State<AppState>) -> Json<ResetResponse> {
    state.circuits.reset_all();

    Json(ResetResponse::new(format!(
        "Reset {} circuit breakers",
        state.circuits.len()
    )))
}

/// Handler for GET /backoff
pub async fn backoff_handler(State(state): State<AppState>) -> Json<BackoffResponse> {
    Json(BackoffResponse::from(state.backoff.as_ref()))
}

/// Handler for GET /health
///
/// Reports "degraded" while any registered circuit is open.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let open: Vec<String> = state
        .circuits
        .metrics()
        .into_iter()
        .filter(|m| m.state == CircuitState::Open)
        .map(|m| m.name)
        .collect();

    Json(HealthResponse::from_open_circuits(open))
}
