//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use credential_broker::config::{BrokerConfig, CacheConfig};
use credential_broker::{
    CacheManager, CircuitBreakerRegistry, Credential, GatewayAdapter, GatewayError,
};

/// One request as seen by the mock gateway.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn is(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path() == path
    }
}

/// A programmable HTTP/1.1 gateway on an ephemeral port.
pub struct MockGateway {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockGateway {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests().iter().filter(|r| r.is(method, path)).count()
    }

    pub fn total(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Start a mock gateway. `handler` maps each request to `(status, body)`.
pub async fn start_mock_gateway<F, Fut>(handler: F) -> MockGateway
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let log = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        log.lock().unwrap().push(request.clone());
                        let (status, body) = handler(request).await;
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockGateway { addr, requests }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

pub fn credential_json(id: &str) -> String {
    format!(r#"{{"id":"{id}","key":"key-{id}","secret":"secret-{id}","algorithm":"HS256"}}"#)
}

/// Config tuned for fast tests: short timeouts, near-zero backoff.
pub fn test_config(base_url: &str, topology: &str) -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.gateway.base_url = base_url.to_string();
    config.gateway.token = "test-token".into();
    config.gateway.topology = topology.into();
    config.gateway.request_timeout_ms = 1000;
    config.retries.max_attempts = 1;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config.cache = CacheConfig {
        ttl_secs: 60,
        max_entries: 100,
        stale_data_tolerance_minutes: 10,
        ..Default::default()
    };
    config
}

pub struct Broker {
    pub adapter: GatewayAdapter,
    pub cache: Arc<CacheManager<Credential>>,
    pub breakers: Arc<CircuitBreakerRegistry>,
}

pub fn build_broker(config: &BrokerConfig) -> Result<Broker, GatewayError> {
    let cache = Arc::new(CacheManager::new(config.cache.clone()).unwrap());
    let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone(), cache.clone()));
    let adapter =
        GatewayAdapter::new(&config.gateway, &config.retries, cache.clone(), breakers.clone())?;
    Ok(Broker {
        adapter,
        cache,
        breakers,
    })
}
