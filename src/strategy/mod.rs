//! Topology strategies for reaching the gateway admin API.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → config.rs (StrategyConfig::resolve: topology, base URL, control plane)
//!     → ModeStrategy::new (picks the variant once)
//!         ├── direct.rs  (Admin-Token header, /consumers/{id}/credential)
//!         └── managed.rs (Bearer header, identity lookup, realm setup)
//! ```
//!
//! # Design Decisions
//! - A tagged enum, not trait objects: both variants are matched exhaustively
//! - Identity resolution and prerequisite setup exist on both variants;
//!   the direct variant answers immediately

pub mod config;
pub mod direct;
pub mod managed;

use reqwest::header::HeaderMap;
use url::Url;

pub use config::{StrategyConfig, Topology};
pub use direct::DirectStrategy;
pub use managed::ManagedStrategy;

use crate::gateway::client::GatewayClient;
use crate::gateway::types::{GatewayError, GatewayResult};

pub enum ModeStrategy {
    Direct(DirectStrategy),
    Managed(ManagedStrategy),
}

impl ModeStrategy {
    /// Build the variant selected by `config.topology`.
    pub fn new(config: StrategyConfig, client: GatewayClient) -> GatewayResult<Self> {
        match config.topology {
            Topology::Direct => Ok(ModeStrategy::Direct(DirectStrategy::new(
                config.base_url,
                &config.token,
            )?)),
            Topology::Managed => {
                let control_plane_id = config.control_plane_id.ok_or_else(|| {
                    GatewayError::Configuration(
                        "managed topology requires a control plane id".into(),
                    )
                })?;
                Ok(ModeStrategy::Managed(ManagedStrategy::new(
                    config.base_url,
                    control_plane_id,
                    &config.token,
                    config.realm_id,
                    config.realm_name,
                    client,
                )?))
            }
        }
    }

    pub fn topology(&self) -> Topology {
        match self {
            ModeStrategy::Direct(_) => Topology::Direct,
            ModeStrategy::Managed(_) => Topology::Managed,
        }
    }

    /// Auth headers this strategy would send for `token`.
    pub fn create_auth_headers(&self, token: &str) -> GatewayResult<HeaderMap> {
        match self {
            ModeStrategy::Direct(_) => DirectStrategy::create_auth_headers(token),
            ModeStrategy::Managed(_) => ManagedStrategy::create_auth_headers(token),
        }
    }

    /// Auth headers built from the configured token.
    pub fn headers(&self) -> &HeaderMap {
        match self {
            ModeStrategy::Direct(strategy) => strategy.headers(),
            ModeStrategy::Managed(strategy) => strategy.headers(),
        }
    }

    /// Map an external owner id to the id the credential API expects.
    /// `None` means the identity does not exist.
    pub async fn resolve_identity(&self, owner_id: &str) -> GatewayResult<Option<String>> {
        match self {
            ModeStrategy::Direct(_) => Ok(Some(owner_id.to_string())),
            ModeStrategy::Managed(strategy) => strategy.resolve_identity(owner_id).await,
        }
    }

    /// Credential URL for `owner_id`, or `None` if the identity does not exist.
    pub async fn build_credential_url(&self, owner_id: &str) -> GatewayResult<Option<String>> {
        match self {
            ModeStrategy::Direct(strategy) => Ok(Some(strategy.credential_url(owner_id))),
            ModeStrategy::Managed(strategy) => Ok(strategy
                .resolve_identity(owner_id)
                .await?
                .map(|internal_id| strategy.credential_url(&internal_id))),
        }
    }

    /// Credential URL for an id already returned by [`Self::resolve_identity`].
    pub fn credential_url_for(&self, resolved_id: &str) -> String {
        match self {
            ModeStrategy::Direct(strategy) => strategy.credential_url(resolved_id),
            ModeStrategy::Managed(strategy) => strategy.credential_url(resolved_id),
        }
    }

    pub fn build_health_url(&self) -> String {
        match self {
            ModeStrategy::Direct(strategy) => strategy.health_url(),
            ModeStrategy::Managed(strategy) => strategy.health_url(),
        }
    }

    /// Idempotent setup required before consumer-level calls.
    pub async fn ensure_prerequisites(&self) -> GatewayResult<()> {
        match self {
            ModeStrategy::Direct(_) => Ok(()),
            ModeStrategy::Managed(strategy) => strategy.ensure_prerequisites().await,
        }
    }
}

/// Append escaped path segments to `base`.
pub(crate) fn join_path(base: &Url, segments: &[&str]) -> String {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url.to_string()
}
