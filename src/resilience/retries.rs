//! Retry logic for raw gateway calls.
//!
//! Only the final outcome of a retry sequence is visible to callers, so a
//! blip that succeeds on the second attempt never reaches the circuit
//! breaker. Classification lives on [`GatewayError::is_retryable`].

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::gateway::types::{GatewayError, GatewayResult};
use crate::resilience::backoff::{calculate_backoff, max_backoff};

/// Attempt budget and backoff bounds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Longest a full retry sequence can take when every attempt runs into
    /// `per_attempt` and every backoff draws its maximum jitter.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let backoff: Duration = (1..self.max_attempts)
            .map(|attempt| max_backoff(attempt, self.base_delay_ms, self.max_delay_ms))
            .sum();
        per_attempt.saturating_mul(self.max_attempts) + backoff
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
                    tracing::debug!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Gateway call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(
                            call = label,
                            attempts = attempt,
                            error = %err,
                            "Retry budget exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
