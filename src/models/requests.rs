//! Request DTOs for the operator API

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{MAX_KEY_LENGTH, MAX_VALUE_SIZE};

/// Request body for the SET operation (PUT /set)
///
/// `value` is any JSON document. `ttl` is in seconds; when omitted the
/// server default applies.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.ttl == Some(0) {
            return Some("TTL must be greater than 0".to_string());
        }
        match serde_json::to_vec(&self.value) {
            Ok(bytes) if bytes.len() > MAX_VALUE_SIZE => Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )),
            Ok(_) => None,
            Err(err) => Some(format!("Value is not serializable: {err}")),
        }
    }

    /// Request TTL, or `default` when the request has none.
    pub fn ttl_or(&self, default: Option<Duration>) -> Option<Duration> {
        self.ttl.map(Duration::from_secs).or(default)
    }
}
