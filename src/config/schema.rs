//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the broker.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the credential broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Upstream gateway admin API settings.
    pub gateway: GatewayConfig,

    /// Circuit breaker thresholds, shared by every operation.
    pub breaker: BreakerConfig,

    /// Primary and stale cache settings.
    pub cache: CacheConfig,

    /// Retry configuration for raw gateway calls.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Upstream gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Admin API base URL. For the managed topology this must contain a
    /// `control-planes/{id}` path segment.
    pub base_url: String,

    /// Admin token (direct) or personal access token (managed).
    pub token: String,

    /// Deployment topology: `"direct"` or `"managed"`.
    pub topology: String,

    /// Pre-provisioned realm id (managed topology only).
    pub realm_id: Option<String>,

    /// Realm name to ensure; defaults to `broker-{control_plane_id}`.
    pub realm_name: Option<String>,

    /// Per-attempt request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Signing algorithm requested when issuing a new credential.
    pub credential_algorithm: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            token: String::new(),
            topology: "direct".to_string(),
            realm_id: None,
            realm_name: None,
            request_timeout_ms: 3_000,
            credential_algorithm: "HS256".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Deadline for one wrapped action (all retries included) in milliseconds.
    pub timeout_ms: u64,

    /// Failure percentage in the rolling window that opens the circuit.
    pub error_threshold_percentage: u32,

    /// Minimum number of calls in the window before the circuit may open.
    pub volume_threshold: u32,

    /// Time spent Open before a half-open trial is admitted, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Length of the rolling statistics window in milliseconds.
    pub rolling_count_timeout_ms: u64,

    /// Number of buckets the rolling window is divided into.
    pub rolling_count_buckets: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            error_threshold_percentage: 50,
            volume_threshold: 5,
            reset_timeout_ms: 30_000,
            rolling_count_timeout_ms: 10_000,
            rolling_count_buckets: 10,
        }
    }
}

impl BreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_count_timeout_ms)
    }

    /// Width of a single bucket in the rolling window.
    pub fn bucket_width(&self) -> Duration {
        let buckets = u64::from(self.rolling_count_buckets.max(1));
        Duration::from_millis((self.rolling_count_timeout_ms / buckets).max(1))
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the shared Redis store instead of the process-local map.
    pub high_availability: bool,

    /// Default time-to-live for primary entries in seconds.
    pub ttl_secs: u64,

    /// Capacity of the process-local primary store.
    pub max_entries: usize,

    /// Retention of stale entries in minutes.
    pub stale_data_tolerance_minutes: u64,

    /// Redis connection URL (high availability only).
    pub redis_url: String,

    /// Prefix applied to every key written to Redis.
    pub key_prefix: String,

    /// Deadline for one shared-store call, connection setup included, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            high_availability: false,
            ttl_secs: 300,
            max_entries: 1_000,
            stale_data_tolerance_minutes: 30,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "credential-broker:".to_string(),
            timeout_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.stale_data_tolerance_minutes * 60)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
