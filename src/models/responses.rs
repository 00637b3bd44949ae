//! Response DTOs for the operator API

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::resilience::{AdaptiveBackoff, CircuitBreakerMetrics};

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
    /// TTL applied to the entry in seconds, absent when it never expires
    pub ttl: Option<u64>,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, ttl: Option<u64>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            ttl,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Entries held by L1 before the clear
    pub cleared: usize,
}

impl ClearResponse {
    pub fn new(cleared: usize) -> Self {
        Self {
            message: "Cache cleared".to_string(),
            cleared,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub warm_loads: u64,
    pub total_entries: usize,
    /// (hits + l2_hits) / (hits + misses)
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            l2_hits: stats.l2_hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            warm_loads: stats.warm_loads,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for GET /circuits
#[derive(Debug, Clone, Serialize)]
pub struct CircuitsResponse {
    pub circuits: Vec<CircuitBreakerMetrics>,
}

/// Outcome counters of one error type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorTypeOutcomes {
    pub error_type: String,
    pub failures: u64,
    pub successes: u64,
}

/// Response body for GET /backoff
#[derive(Debug, Clone, Serialize)]
pub struct BackoffResponse {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Load factor in `[0, 1]` currently scaling every delay
    pub system_load: f64,
    pub outcomes: Vec<ErrorTypeOutcomes>,
}

impl From<&AdaptiveBackoff> for BackoffResponse {
    fn from(backoff: &AdaptiveBackoff) -> Self {
        let config = backoff.config();
        Self {
            base_delay_ms: config.base_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            jitter_min: config.jitter_min,
            jitter_max: config.jitter_max,
            system_load: backoff.system_load(),
            outcomes: backoff
                .all_outcomes()
                .into_iter()
                .map(|(error_type, counts)| ErrorTypeOutcomes {
                    error_type,
                    failures: counts.failures,
                    successes: counts.successes,
                })
                .collect(),
        }
    }
}

/// Response body for the operator reset endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

impl ResetResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" while any circuit is open
    pub status: String,
    pub open_circuits: Vec<String>,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn from_open_circuits(open_circuits: Vec<String>) -> Self {
        let status = if open_circuits.is_empty() {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            open_circuits,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_response_serialize() {
        let resp = GetResponse::new("test_key", json!({"rent": 950}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("test_key"));
        assert!(json.contains("\"rent\":950"));
    }

    #[test]
    fn test_set_response_serialize() {
        let resp = SetResponse::new("my_key", Some(60));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("my_key"));
        assert!(json.contains("successfully"));
        assert!(json.contains("\"ttl\":60"));
    }

    #[test]
    fn test_delete_response_serialize() {
        let resp = DeleteResponse::new("deleted_key");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("deleted_key"));
        assert!(json.contains("deleted"));
    }

    #[test]
    fn test_stats_response_from_stats() {
        let stats = CacheStats {
            hits: 70,
            l2_hits: 10,
            misses: 30,
            evictions: 5,
            expirations: 3,
            warm_loads: 2,
            total_entries: 100,
        };
        let resp = StatsResponse::from(stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.l2_hits, 10);
        assert_eq!(resp.expirations, 3);
        assert_eq!(resp.warm_loads, 2);
    }

    #[test]
    fn test_backoff_response_from_backoff() {
        use crate::resilience::BackoffConfig;
        use std::time::Duration;

        let backoff = AdaptiveBackoff::new(
            BackoffConfig::default()
                .with_base_delay(Duration::from_millis(250))
                .with_max_delay(Duration::from_secs(10)),
        );
        backoff.record_failure("http_429");
        backoff.set_system_load(0.25);

        let resp = BackoffResponse::from(&backoff);
        assert_eq!(resp.base_delay_ms, 250);
        assert_eq!(resp.max_delay_ms, 10_000);
        assert_eq!(resp.system_load, 0.25);
        assert_eq!(
            resp.outcomes,
            vec![ErrorTypeOutcomes {
                error_type: "http_429".to_string(),
                failures: 1,
                successes: 0,
            }]
        );
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::from(CacheStats::new());
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_status() {
        let healthy = HealthResponse::from_open_circuits(Vec::new());
        assert_eq!(healthy.status, "healthy");
        let json = serde_json::to_string(&healthy).unwrap();
        assert!(json.contains("timestamp"));

        let degraded = HealthResponse::from_open_circuits(vec!["scraper".to_string()]);
        assert_eq!(degraded.status, "degraded");
    }
}
