//! Synchronization policy for the KV client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, SyncResult};
use crate::record::RecordKey;

/// How long a cached read stays valid (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Quiet period after the last `set` before a key is flushed (1 second).
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Fixed delay before a transient write failure is retried (5 seconds).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Largest serialized value the client will try to send (4 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Key written synchronously instead of through the debounce queue.
pub const DEFAULT_CRITICAL_KEY: &str = "pantry";

/// Timing and routing policy for the synchronized KV client.
///
/// Durations are (de)serialized as whole milliseconds (`cache_ttl_ms`, ...).
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Validity window of a cached read.
    #[serde(rename = "cache_ttl_ms", with = "duration_ms")]
    pub cache_ttl: Duration,
    /// Debounce window for queued writes.
    #[serde(rename = "debounce_ms", with = "duration_ms")]
    pub debounce_window: Duration,
    /// Delay before retrying a transient failure.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
    /// Keys that bypass the queue and are written inline.
    pub critical_keys: Vec<RecordKey>,
    /// Client-side payload limit; larger values are rejected before sending.
    pub max_payload_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            retry_delay: DEFAULT_RETRY_DELAY,
            critical_keys: vec![RecordKey(DEFAULT_CRITICAL_KEY.to_string())],
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_critical_keys(mut self, keys: Vec<RecordKey>) -> Self {
        self.critical_keys = keys;
        self
    }

    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    /// Whether writes to `key` bypass the debounce queue.
    pub fn is_critical(&self, key: &RecordKey) -> bool {
        self.critical_keys.iter().any(|k| k == key)
    }

    /// Validate the configuration.
    ///
    /// Zero durations would turn the retry loop into a busy loop and the
    /// cache into a no-op, so all durations must be positive.
    pub fn validate(&self) -> SyncResult<()> {
        let durations = [
            ("cache_ttl", self.cache_ttl),
            ("debounce_window", self.debounce_window),
            ("retry_delay", self.retry_delay),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: "must be positive".to_string(),
                }
                .into());
            }
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_payload_bytes".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Durations serialized as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
