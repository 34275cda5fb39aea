//! Business operations against the gateway admin API.
//!
//! # Responsibilities
//! - Serve credential reads from the cache, going remote only on a miss
//! - Issue new credentials for known identities
//! - Probe gateway health
//! - Mirror every fresh credential into the primary and stale cache tiers
//!
//! # Data Flow
//! ```text
//! get_credential(owner)
//!     → cache.get (hit: done)
//!     → registry.read_credential ── open/failed ──→ stale store
//!         → strategy.ensure_prerequisites
//!         → strategy.build_credential_url (unknown identity: None)
//!         → client.get_json (retry inside)
//!         → cache.set + cache.set_stale
//!
//! create_credential(owner)
//!     → registry.create_credential ── open/failed ──→ None
//!         → strategy.resolve_identity (unknown identity: None)
//!         → strategy.ensure_prerequisites
//!         → client.post_json (retry inside)
//!         → cache.set + cache.set_stale
//! ```
//!
//! None of the business operations return an error: remote failures end up
//! as `None` or an unhealthy report. Only construction can fail.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cache::{CacheManager, CacheStats};
use crate::config::{GatewayConfig, RetryConfig};
use crate::gateway::client::GatewayClient;
use crate::gateway::types::{Credential, CredentialPayload, GatewayResult, HealthReport};
use crate::observability::metrics;
use crate::resilience::{BreakerStats, CircuitBreakerRegistry, RetryPolicy};
use crate::strategy::{ModeStrategy, StrategyConfig, Topology};

#[derive(Debug, Serialize)]
struct NewCredential<'a> {
    algorithm: &'a str,
}

pub struct GatewayAdapter {
    strategy: ModeStrategy,
    client: GatewayClient,
    cache: Arc<CacheManager<Credential>>,
    breakers: Arc<CircuitBreakerRegistry>,
    algorithm: String,
}

impl GatewayAdapter {
    /// Resolve the topology and build the HTTP client.
    ///
    /// Fails with [`GatewayError::Configuration`](crate::gateway::GatewayError)
    /// before any network call when the base URL does not fit the topology.
    pub fn new(
        gateway: &GatewayConfig,
        retries: &RetryConfig,
        cache: Arc<CacheManager<Credential>>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> GatewayResult<Self> {
        let strategy_config = StrategyConfig::resolve(gateway)?;
        let client = GatewayClient::new(gateway.request_timeout(), RetryPolicy::from(retries))?;

        tracing::info!(
            topology = %strategy_config.topology,
            base_url = %strategy_config.base_url,
            control_plane = strategy_config.control_plane_id.as_deref().unwrap_or("-"),
            "Gateway adapter initialized"
        );

        Ok(Self {
            strategy: ModeStrategy::new(strategy_config, client.clone())?,
            client,
            cache,
            breakers,
            algorithm: gateway.credential_algorithm.clone(),
        })
    }

    pub fn topology(&self) -> Topology {
        self.strategy.topology()
    }

    /// Credential of `owner_id`, from cache when possible.
    ///
    /// On a remote failure the last known value is served from the stale
    /// store; `None` means absent or unavailable.
    pub async fn get_credential(&self, owner_id: &str) -> Option<Credential> {
        let key = Credential::cache_key(owner_id);
        if let Some(credential) = self.cache.get(&key).await {
            tracing::debug!(owner_id = %owner_id, "Credential cache hit");
            return Some(credential);
        }

        self.breakers
            .read_credential(&key, || self.fetch_credential(owner_id, &key))
            .await
    }

    /// Issue a new credential for `owner_id`. `None` if the identity is
    /// unknown or the gateway could not issue one.
    pub async fn create_credential(&self, owner_id: &str) -> Option<Credential> {
        self.breakers
            .create_credential(|| self.issue_credential(owner_id))
            .await
    }

    /// Probe the gateway. Latency is measured even when short-circuited.
    pub async fn health_check(&self) -> HealthReport {
        let url = self.strategy.build_health_url();
        let started = Instant::now();
        let outcome = self
            .breakers
            .health(|| self.client.probe(&url, self.strategy.headers()))
            .await;
        let elapsed = started.elapsed();

        metrics::record_health_probe(outcome.is_ok(), elapsed);
        if let Err(reason) = &outcome {
            tracing::warn!(url = %url, error = %reason, "Gateway unhealthy");
        }

        HealthReport {
            healthy: outcome.is_ok(),
            response_time_ms: elapsed.as_millis() as u64,
            error: outcome.err(),
        }
    }

    /// Forget one owner's credential in both tiers, or empty the primary tier.
    pub async fn clear_cache(&self, owner_id: Option<&str>) {
        match owner_id {
            Some(owner_id) => {
                let key = Credential::cache_key(owner_id);
                self.cache.delete(&key).await;
                self.cache.delete_stale(&key);
                tracing::info!(owner_id = %owner_id, "Credential evicted from cache");
            }
            None => {
                self.cache.clear().await;
                tracing::info!("Credential cache cleared");
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn circuit_breaker_stats(&self) -> BTreeMap<String, BreakerStats> {
        self.breakers.stats()
    }

    async fn fetch_credential(
        &self,
        owner_id: &str,
        key: &str,
    ) -> GatewayResult<Option<Credential>> {
        self.strategy.ensure_prerequisites().await?;
        let Some(url) = self.strategy.build_credential_url(owner_id).await? else {
            tracing::debug!(owner_id = %owner_id, "Unknown identity");
            return Ok(None);
        };

        let payload: CredentialPayload = self.client.get_json(&url, self.strategy.headers()).await?;
        let credential = payload.into_credential(owner_id)?;
        self.remember(key, &credential).await;
        Ok(Some(credential))
    }

    /// Runs inside the `create-credential` breaker, identity lookup included.
    async fn issue_credential(&self, owner_id: &str) -> GatewayResult<Option<Credential>> {
        let Some(resolved_id) = self.strategy.resolve_identity(owner_id).await? else {
            tracing::debug!(owner_id = %owner_id, "Unknown identity, nothing to issue");
            return Ok(None);
        };

        self.strategy.ensure_prerequisites().await?;
        let url = self.strategy.credential_url_for(&resolved_id);
        let body = NewCredential {
            algorithm: &self.algorithm,
        };

        let payload: CredentialPayload = self
            .client
            .post_json(&url, self.strategy.headers(), &body)
            .await?;
        let credential = payload.into_credential(owner_id)?;
        tracing::info!(owner_id = %owner_id, credential_id = %credential.id, "Credential issued");

        self.remember(&Credential::cache_key(owner_id), &credential).await;
        Ok(Some(credential))
    }

    /// Primary first, then stale.
    async fn remember(&self, key: &str, credential: &Credential) {
        self.cache.set(key, credential.clone(), None).await;
        self.cache.set_stale(key, credential.clone(), None);
    }
}
