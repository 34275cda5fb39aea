//! HTTP client for the gateway admin API.
//!
//! # Responsibilities
//! - Send one request with a per-attempt timeout
//! - Classify the response into a value or a [`GatewayError`]
//! - Repeat retryable failures through the retry policy
//!
//! The client knows nothing about topologies; callers pass the URL and the
//! auth headers their strategy produced.

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::gateway::types::{GatewayError, GatewayResult};
use crate::resilience::retries::RetryPolicy;

/// Longest slice of an error body kept in a [`GatewayError::Remote`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl GatewayClient {
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("credential-broker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            request_timeout,
            retry,
        })
    }

    /// GET `url` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> GatewayResult<T> {
        let body = self
            .retry
            .run(url, || self.send_once(Method::GET, url, headers, None))
            .await?;
        decode(&body)
    }

    /// POST a JSON body to `url` and decode the JSON response.
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        headers: &HeaderMap,
        payload: &B,
    ) -> GatewayResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let payload =
            serde_json::to_value(payload).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let body = self
            .retry
            .run(url, || self.send_once(Method::POST, url, headers, Some(&payload)))
            .await?;
        decode(&body)
    }

    /// GET `url` and only check for a 2xx status.
    pub async fn probe(&self, url: &str, headers: &HeaderMap) -> GatewayResult<()> {
        self.retry
            .run(url, || self.send_once(Method::GET, url, headers, None))
            .await
            .map(|_| ())
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        payload: Option<&serde_json::Value>,
    ) -> GatewayResult<String> {
        let mut request = self.http.request(method, url).headers(headers.clone());
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.is_success() {
            return Ok(body);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        Err(GatewayError::Remote {
            status: status.as_u16(),
            message: truncate(body),
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.request_timeout.as_millis() as u64)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> GatewayResult<T> {
    serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
