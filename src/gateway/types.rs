//! Credential types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A signing credential issued by the gateway for one consumer.
///
/// Only ever produced from a gateway response; the broker never mints one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub key: String,
    pub secret: String,
    pub owner_id: String,
}

impl Credential {
    /// Cache key under which the credential of `owner_id` is stored.
    pub fn cache_key(owner_id: &str) -> String {
        format!("credential:{owner_id}")
    }
}

/// Credential object as returned by the admin API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CredentialRecord {
    pub id: String,
    pub key: String,
    pub secret: String,
}

/// The admin API answers either with the object itself or with a list envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CredentialPayload {
    List { data: Vec<CredentialRecord> },
    Single(CredentialRecord),
}

impl CredentialPayload {
    /// Take the first credential out of the payload.
    pub fn into_credential(self, owner_id: &str) -> GatewayResult<Credential> {
        let record = match self {
            CredentialPayload::Single(record) => record,
            CredentialPayload::List { data } => {
                data.into_iter().next().ok_or(GatewayError::NotFound)?
            }
        };
        Ok(Credential {
            id: record.id,
            key: record.key,
            secret: record.secret,
            owner_id: owner_id.to_string(),
        })
    }
}

/// Outcome of a gateway health probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Errors that can occur while talking to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Local misconfiguration detected at construction. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The consumer, identity or credential does not exist.
    #[error("Resource not found")]
    NotFound,

    /// The call exceeded its deadline.
    #[error("Gateway timeout after {0} ms")]
    Timeout(u64),

    /// Non-2xx response other than 404.
    #[error("Gateway returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// Connection-level failure before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape.
    #[error("Malformed gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Timeouts, connection failures and 5xx responses are retried.
    /// Every other 4xx fails fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout(_) | GatewayError::Transport(_) => true,
            GatewayError::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    /// A create rejected because an entity with the same name already exists.
    pub fn is_duplicate_name(&self) -> bool {
        match self {
            GatewayError::Remote { status: 409, .. } => true,
            GatewayError::Remote { status, message } if *status == 400 => {
                let message = message.to_ascii_lowercase();
                message.contains("duplicate") || message.contains("already exists")
            }
            _ => false,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
