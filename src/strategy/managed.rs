//! Managed topology: a hosted control plane behind a multi-tenant API.
//!
//! # Responsibilities
//! - Resolve an external owner id to the control plane's internal consumer id
//! - Make sure a realm scoped to the control plane exists before consumer calls
//! - Bearer-token authentication
//!
//! # Design Decisions
//! - The realm id is resolved at most once per process (memoised)
//! - Losing a creation race to another instance is success, not an error

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use crate::gateway::client::GatewayClient;
use crate::gateway::types::{GatewayError, GatewayResult};
use crate::strategy::join_path;

#[derive(Debug, Deserialize)]
struct Identity {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Realm {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RealmList {
    #[serde(default)]
    data: Vec<Realm>,
}

#[derive(Debug, Serialize)]
struct NewRealm<'a> {
    name: &'a str,
    allowed_control_planes: [&'a str; 1],
}

pub struct ManagedStrategy {
    base_url: Url,
    realms_url: Url,
    control_plane_id: String,
    realm_name: String,
    headers: HeaderMap,
    client: GatewayClient,
    realm: OnceCell<String>,
}

impl ManagedStrategy {
    pub fn new(
        base_url: Url,
        control_plane_id: String,
        token: &str,
        realm_id: Option<String>,
        realm_name: Option<String>,
        client: GatewayClient,
    ) -> GatewayResult<Self> {
        let mut realms_url = base_url.clone();
        realms_url.set_path("/v1/realms");
        realms_url.set_query(None);

        let realm = match realm_id {
            Some(id) => OnceCell::new_with(Some(id)),
            None => OnceCell::new(),
        };

        Ok(Self {
            headers: Self::create_auth_headers(token)?,
            realm_name: realm_name.unwrap_or_else(|| format!("broker-{control_plane_id}")),
            base_url,
            realms_url,
            control_plane_id,
            client,
            realm,
        })
    }

    /// Bearer token header.
    pub fn create_auth_headers(token: &str) -> GatewayResult<HeaderMap> {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            GatewayError::Configuration("access token is not a valid header value".into())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn control_plane_id(&self) -> &str {
        &self.control_plane_id
    }

    /// Realm id, once ensured.
    pub fn realm_id(&self) -> Option<&str> {
        self.realm.get().map(String::as_str)
    }

    /// Internal consumer id for `owner_id`, or `None` if the identity is unknown.
    pub async fn resolve_identity(&self, owner_id: &str) -> GatewayResult<Option<String>> {
        let url = join_path(&self.base_url, &["identities", owner_id]);
        match self.client.get_json::<Identity>(&url, &self.headers).await {
            Ok(identity) => Ok(Some(identity.id)),
            Err(GatewayError::NotFound) => {
                tracing::debug!(owner_id = %owner_id, "Identity not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn credential_url(&self, internal_id: &str) -> String {
        join_path(&self.base_url, &["core-entities", "consumers", internal_id, "credential"])
    }

    pub fn health_url(&self) -> String {
        self.base_url.to_string()
    }

    /// Make sure the control plane's realm exists, creating it if needed.
    pub async fn ensure_prerequisites(&self) -> GatewayResult<()> {
        self.realm
            .get_or_try_init(|| self.find_or_create_realm())
            .await
            .map(|_| ())
    }

    async fn find_or_create_realm(&self) -> GatewayResult<String> {
        if let Some(id) = self.find_realm().await? {
            return Ok(id);
        }

        let payload = NewRealm {
            name: self.realm_name.as_str(),
            allowed_control_planes: [self.control_plane_id.as_str()],
        };
        match self
            .client
            .post_json::<_, Realm>(self.realms_url.as_str(), &self.headers, &payload)
            .await
        {
            Ok(realm) => {
                tracing::info!(
                    realm = %realm.name,
                    realm_id = %realm.id,
                    control_plane = %self.control_plane_id,
                    "Realm created"
                );
                Ok(realm.id)
            }
            Err(err) if err.is_duplicate_name() => {
                tracing::debug!(realm = %self.realm_name, "Realm created concurrently elsewhere");
                self.find_realm().await?.ok_or(GatewayError::Remote {
                    status: 409,
                    message: format!(
                        "realm '{}' reported as duplicate but not listed",
                        self.realm_name
                    ),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn find_realm(&self) -> GatewayResult<Option<String>> {
        let mut url = self.realms_url.clone();
        url.query_pairs_mut()
            .append_pair("filter[name][eq]", &self.realm_name);
        let realms: RealmList = self.client.get_json(url.as_str(), &self.headers).await?;
        Ok(realms
            .data
            .into_iter()
            .find(|realm| realm.name == self.realm_name)
            .map(|realm| realm.id))
    }
}
