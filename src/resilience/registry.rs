//! Per-operation breakers and their fallback policies.
//!
//! Breakers are created on first use and live as long as the registry.
//! Each business operation has a fixed fallback:
//! - `read-credential`: last known value from the stale store, else `None`
//! - `create-credential`: always `None`; a new credential has no stale stand-in
//! - `health`: unhealthy, with "circuit open" when short-circuited

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::config::BreakerConfig;
use crate::gateway::types::{Credential, GatewayError, GatewayResult};
use crate::resilience::circuit_breaker::{
    BreakerError, BreakerStats, CircuitBreaker, CircuitStatus, Operation,
};

pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<Operation, Arc<CircuitBreaker>>,
    cache: Arc<CacheManager<Credential>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig, cache: Arc<CacheManager<Credential>>) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            cache,
        }
    }

    /// Breaker for `operation`, created on first use.
    pub fn breaker(&self, operation: Operation) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(operation, self.config.clone())))
            .clone()
    }

    pub fn status(&self, operation: Operation) -> CircuitStatus {
        self.breaker(operation).status()
    }

    /// Force a breaker back to Closed.
    pub fn reset(&self, operation: Operation) {
        self.breaker(operation).reset();
    }

    /// Stats for every breaker that has been used so far.
    pub fn stats(&self) -> BTreeMap<String, BreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();
        breakers
            .into_iter()
            .map(|breaker| (breaker.operation().to_string(), breaker.stats()))
            .collect()
    }

    /// Read through the `read-credential` breaker, falling back to the stale
    /// store when the call is short-circuited or fails.
    pub async fn read_credential<F, Fut>(&self, cache_key: &str, action: F) -> Option<Credential>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Option<Credential>>>,
    {
        let breaker = self.breaker(Operation::ReadCredential);
        match breaker.call(action).await {
            Ok(credential) => credential,
            Err(BreakerError::Failed(GatewayError::NotFound)) => None,
            Err(err) => {
                breaker.record_fallback();
                let stale = self.cache.get_stale(cache_key);
                tracing::debug!(
                    operation = %Operation::ReadCredential,
                    key = %cache_key,
                    error = %err,
                    served_stale = stale.is_some(),
                    "Read fallback"
                );
                stale
            }
        }
    }

    /// Issue through the `create-credential` breaker. Any failure denies.
    pub async fn create_credential<F, Fut>(&self, action: F) -> Option<Credential>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Option<Credential>>>,
    {
        let breaker = self.breaker(Operation::CreateCredential);
        match breaker.call(action).await {
            Ok(credential) => credential,
            Err(BreakerError::Failed(GatewayError::NotFound)) => None,
            Err(err) => {
                breaker.record_fallback();
                tracing::warn!(
                    operation = %Operation::CreateCredential,
                    error = %err,
                    "Credential issuance denied"
                );
                None
            }
        }
    }

    /// Probe through the `health` breaker. `Err` carries the unhealthy reason.
    pub async fn health<F, Fut>(&self, action: F) -> Result<(), String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<()>>,
    {
        let breaker = self.breaker(Operation::Health);
        match breaker.call(action).await {
            Ok(()) => Ok(()),
            Err(err) => {
                breaker.record_fallback();
                Err(match err {
                    BreakerError::Open(_) => "circuit open".to_string(),
                    other => other.to_string(),
                })
            }
        }
    }
}
