//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::resilience::{BackoffConfig, CircuitBreakerConfig};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of entries the L1 cache can hold
    pub max_entries: usize,
    /// TTL in seconds applied by the API when a request omits one
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Number of hot keys the warmer reloads
    pub warm_top_n: usize,
    /// Consecutive failures that open a circuit
    pub cb_failure_threshold: u32,
    /// Seconds an open circuit waits before probing
    pub cb_recovery_timeout: u64,
    /// Seconds a half-open circuit waits before closing
    pub cb_half_open_timeout: u64,
    /// Seconds of quiet after which failure counts decay
    pub cb_reset_timeout: u64,
    /// Backoff base delay in milliseconds
    pub backoff_base_delay_ms: u64,
    /// Backoff delay cap in milliseconds
    pub backoff_max_delay_ms: u64,
    /// Upstream circuits registered at startup with the breaker defaults
    pub circuits: Vec<String>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list; blank items are dropped.
fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .map(|raw| parse_list(&raw))
        .unwrap_or_default()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `WARM_TOP_N` - Warming cap (default: 100)
    /// - `CB_FAILURE_THRESHOLD` - Breaker failure threshold (default: 5)
    /// - `CB_RECOVERY_TIMEOUT` - Seconds (default: 60)
    /// - `CB_HALF_OPEN_TIMEOUT` - Seconds (default: 30)
    /// - `CB_RESET_TIMEOUT` - Seconds (default: 600)
    /// - `BACKOFF_BASE_DELAY_MS` - Milliseconds (default: 1000)
    /// - `BACKOFF_MAX_DELAY_MS` - Milliseconds (default: 60000)
    /// - `CIRCUITS` - Comma-separated circuit names to pre-register (default: none)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            warm_top_n: env_or("WARM_TOP_N", defaults.warm_top_n),
            cb_failure_threshold: env_or("CB_FAILURE_THRESHOLD", defaults.cb_failure_threshold),
            cb_recovery_timeout: env_or("CB_RECOVERY_TIMEOUT", defaults.cb_recovery_timeout),
            cb_half_open_timeout: env_or("CB_HALF_OPEN_TIMEOUT", defaults.cb_half_open_timeout),
            cb_reset_timeout: env_or("CB_RESET_TIMEOUT", defaults.cb_reset_timeout),
            backoff_base_delay_ms: env_or("BACKOFF_BASE_DELAY_MS", defaults.backoff_base_delay_ms),
            backoff_max_delay_ms: env_or("BACKOFF_MAX_DELAY_MS", defaults.backoff_max_delay_ms),
            circuits: env_list("CIRCUITS"),
        }
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidRequest(
                "MAX_ENTRIES must be greater than 0".to_string(),
            ));
        }
        if self.cleanup_interval == 0 {
            return Err(CacheError::InvalidRequest(
                "CLEANUP_INTERVAL must be greater than 0".to_string(),
            ));
        }
        if self.cb_failure_threshold == 0 {
            return Err(CacheError::InvalidRequest(
                "CB_FAILURE_THRESHOLD must be greater than 0".to_string(),
            ));
        }
        if self.backoff_base_delay_ms > self.backoff_max_delay_ms {
            return Err(CacheError::InvalidRequest(format!(
                "BACKOFF_BASE_DELAY_MS ({}) exceeds BACKOFF_MAX_DELAY_MS ({})",
                self.backoff_base_delay_ms, self.backoff_max_delay_ms
            )));
        }
        Ok(())
    }

    /// Default TTL as a duration; `0` means entries never expire.
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl > 0).then(|| Duration::from_secs(self.default_ttl))
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.cb_failure_threshold)
            .with_recovery_timeout(Duration::from_secs(self.cb_recovery_timeout))
            .with_half_open_timeout(Duration::from_secs(self.cb_half_open_timeout))
            .with_reset_timeout(Duration::from_secs(self.cb_reset_timeout))
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig::default()
            .with_base_delay(Duration::from_millis(self.backoff_base_delay_ms))
            .with_max_delay(Duration::from_millis(self.backoff_max_delay_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: 300,
            server_port: 3000,
            cleanup_interval: 1,
            warm_top_n: 100,
            cb_failure_threshold: 5,
            cb_recovery_timeout: 60,
            cb_half_open_timeout: 30,
            cb_reset_timeout: 600,
            backoff_base_delay_ms: 1000,
            backoff_max_delay_ms: 60_000,
            circuits: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.warm_top_n, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "MAX_ENTRIES",
            "DEFAULT_TTL",
            "SERVER_PORT",
            "CLEANUP_INTERVAL",
            "WARM_TOP_N",
            "CB_FAILURE_THRESHOLD",
            "CB_RECOVERY_TIMEOUT",
            "CB_HALF_OPEN_TIMEOUT",
            "CB_RESET_TIMEOUT",
            "BACKOFF_BASE_DELAY_MS",
            "BACKOFF_MAX_DELAY_MS",
            "CIRCUITS",
        ] {
            env::remove_var(name);
        }

        assert_eq!(Config::from_env(), Config::default());
    }

    #[test]
    fn test_circuit_list_parsing() {
        assert_eq!(
            parse_list(" scraper, geocoder,,llm ,"),
            vec!["scraper".to_string(), "geocoder".to_string(), "llm".to_string()]
        );
        assert!(parse_list("").is_empty());
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_entries = Config {
            max_entries: 0,
            ..Config::default()
        };
        assert!(zero_entries.validate().is_err());

        let zero_threshold = Config {
            cb_failure_threshold: 0,
            ..Config::default()
        };
        assert!(zero_threshold.validate().is_err());

        let inverted_backoff = Config {
            backoff_base_delay_ms: 5000,
            backoff_max_delay_ms: 100,
            ..Config::default()
        };
        assert!(inverted_backoff.validate().is_err());
    }

    #[test]
    fn test_derived_configs() {
        let config = Config::default();

        let breaker = config.breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(breaker.half_open_timeout, Duration::from_secs(30));
        assert_eq!(breaker.reset_timeout, Duration::from_secs(600));

        let backoff = config.backoff_config();
        assert_eq!(backoff.base_delay, Duration::from_secs(1));
        assert_eq!(backoff.max_delay, Duration::from_secs(60));

        assert_eq!(config.default_ttl(), Some(Duration::from_secs(300)));
        let no_ttl = Config {
            default_ttl: 0,
            ..Config::default()
        };
        assert_eq!(no_ttl.default_ttl(), None);
    }
}
