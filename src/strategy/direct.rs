//! Direct topology: the admin API of a self-hosted gateway.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::gateway::types::{GatewayError, GatewayResult};
use crate::strategy::join_path;

pub const ADMIN_TOKEN_HEADER: &str = "admin-token";

#[derive(Debug, Clone)]
pub struct DirectStrategy {
    base_url: Url,
    headers: HeaderMap,
}

impl DirectStrategy {
    pub fn new(base_url: Url, token: &str) -> GatewayResult<Self> {
        Ok(Self {
            headers: Self::create_auth_headers(token)?,
            base_url,
        })
    }

    /// Static admin token header.
    pub fn create_auth_headers(token: &str) -> GatewayResult<HeaderMap> {
        let value = HeaderValue::from_str(token).map_err(|_| {
            GatewayError::Configuration("admin token is not a valid header value".into())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(ADMIN_TOKEN_HEADER), value);
        Ok(headers)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn credential_url(&self, owner_id: &str) -> String {
        join_path(&self.base_url, &["consumers", owner_id, "credential"])
    }

    pub fn health_url(&self) -> String {
        join_path(&self.base_url, &["status"])
    }
}
