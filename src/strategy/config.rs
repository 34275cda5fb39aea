//! Resolved, immutable strategy configuration.

use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::config::GatewayConfig;
use crate::gateway::types::{GatewayError, GatewayResult};

/// Path segment that precedes the control-plane id in a managed base URL.
const CONTROL_PLANE_SEGMENT: &str = "control-planes";

/// How the gateway admin API is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Self-hosted admin API addressed directly.
    Direct,
    /// Hosted control plane behind a multi-tenant API.
    Managed,
}

impl FromStr for Topology {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Topology::Direct),
            "managed" => Ok(Topology::Managed),
            other => Err(GatewayError::Configuration(format!(
                "unsupported topology '{other}' (expected 'direct' or 'managed')"
            ))),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Direct => f.write_str("direct"),
            Topology::Managed => f.write_str("managed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub base_url: Url,
    pub token: String,
    pub topology: Topology,
    pub control_plane_id: Option<String>,
    pub realm_id: Option<String>,
    pub realm_name: Option<String>,
}

impl StrategyConfig {
    /// Resolve from gateway settings, failing on any shape problem.
    pub fn resolve(config: &GatewayConfig) -> GatewayResult<Self> {
        let topology: Topology = config.topology.parse()?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            GatewayError::Configuration(format!("invalid base URL '{}': {e}", config.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(GatewayError::Configuration(format!(
                "base URL '{}' must be an http(s) URL",
                config.base_url
            )));
        }

        let control_plane_id = match topology {
            Topology::Direct => None,
            Topology::Managed => Some(control_plane_id(&base_url).ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "managed base URL '{}' has no '{CONTROL_PLANE_SEGMENT}/{{id}}' segment",
                    config.base_url
                ))
            })?),
        };

        Ok(Self {
            base_url,
            token: config.token.clone(),
            topology,
            control_plane_id,
            realm_id: config.realm_id.clone().filter(|id| !id.is_empty()),
            realm_name: config.realm_name.clone().filter(|name| !name.is_empty()),
        })
    }
}

fn control_plane_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == CONTROL_PLANE_SEGMENT)?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
}
