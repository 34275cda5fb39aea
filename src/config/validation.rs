//! Configuration validation.
//!
//! Serde handles the syntactic side; this module checks value ranges and
//! cross-field constraints. All errors are collected, not just the first.

use crate::config::schema::BrokerConfig;
use crate::resilience::RetryPolicy;
use thiserror::Error;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if url::Url::parse(&config.gateway.base_url).is_err() {
        errors.push(ValidationError::new(
            "gateway.base_url",
            format!("'{}' is not a valid URL", config.gateway.base_url),
        ));
    }
    if config.gateway.request_timeout_ms == 0 {
        errors.push(ValidationError::new("gateway.request_timeout_ms", "must be > 0"));
    }

    let breaker = &config.breaker;
    if breaker.error_threshold_percentage == 0 || breaker.error_threshold_percentage > 100 {
        errors.push(ValidationError::new(
            "breaker.error_threshold_percentage",
            "must be within 1..=100",
        ));
    }
    if breaker.volume_threshold == 0 {
        errors.push(ValidationError::new("breaker.volume_threshold", "must be > 0"));
    }
    if breaker.timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.timeout_ms", "must be > 0"));
    }
    if breaker.rolling_count_buckets == 0 {
        errors.push(ValidationError::new("breaker.rolling_count_buckets", "must be > 0"));
    } else if breaker.rolling_count_timeout_ms % u64::from(breaker.rolling_count_buckets) != 0 {
        errors.push(ValidationError::new(
            "breaker.rolling_count_buckets",
            "must evenly divide rolling_count_timeout_ms",
        ));
    }

    let cache = &config.cache;
    if cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be > 0"));
    }
    if cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be > 0"));
    }
    if cache.stale_data_tolerance_minutes == 0 {
        errors.push(ValidationError::new(
            "cache.stale_data_tolerance_minutes",
            "must be > 0",
        ));
    }
    if cache.high_availability && cache.redis_url.is_empty() {
        errors.push(ValidationError::new(
            "cache.redis_url",
            "required when high_availability is enabled",
        ));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }

    // A breaker deadline shorter than a full retry sequence would cut the
    // sequence short and report a timeout instead of its final outcome.
    if breaker.timeout_ms > 0 && config.gateway.request_timeout_ms > 0 {
        let budget =
            RetryPolicy::from(&config.retries).worst_case(config.gateway.request_timeout());
        if breaker.timeout() < budget {
            errors.push(ValidationError::new(
                "breaker.timeout_ms",
                format!(
                    "must be at least {}ms to cover every retry attempt and backoff",
                    budget.as_millis()
                ),
            ));
        }
    }

    if config.cache.timeout_ms == 0 {
        errors.push(ValidationError::new("cache.timeout_ms", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
