//! Shared Redis-backed cache store.
//!
//! Used when several broker instances must see the same credentials. The
//! store is just another network dependency: every operation can fail and
//! callers decide how to degrade. Values are stored as JSON under a
//! configurable key prefix, with Redis handling expiry.
//!
//! Every call is bounded by the configured timeout: the pool's wait, create
//! and recycle phases, and the command round trip as a whole.

use deadpool_redis::{Config, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

use crate::cache::CacheError;

const SCAN_BATCH: usize = 100;

pub struct SharedStore {
    pool: Pool,
    prefix: String,
    timeout: Duration,
}

impl SharedStore {
    /// Build a connection pool. No connection is opened until first use.
    pub fn connect(redis_url: &str, prefix: &str, timeout: Duration) -> Result<Self, CacheError> {
        let mut config = Config::from_url(redis_url);
        config.pool = Some(PoolConfig {
            timeouts: Timeouts {
                wait: Some(timeout),
                create: Some(timeout),
                recycle: Some(timeout),
            },
            ..PoolConfig::default()
        });
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Configuration(format!("redis pool for '{redis_url}': {e}")))?;
        Ok(Self {
            pool,
            prefix: prefix.to_string(),
            timeout,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Run one store call under the store timeout.
    async fn bounded<R, F>(&self, call: F) -> Result<R, CacheError>
    where
        F: Future<Output = Result<R, CacheError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let raw: Option<String> = self
            .bounded(async {
                let mut conn = self.pool.get().await?;
                Ok::<_, CacheError>(conn.get(self.key(key)).await?)
            })
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            conn.pset_ex::<_, _, ()>(self.key(key), json, ttl_ms).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            conn.del::<_, ()>(self.key(key)).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    /// Delete every key under this store's prefix.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.bounded(self.scan_and_delete()).await
    }

    async fn scan_and_delete(&self) -> Result<usize, CacheError> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                removed += keys.len();
                conn.del::<_, ()>(keys).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    /// Stop handing out connections and drop idle ones.
    pub fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[test]
    fn test_keys_are_prefixed() {
        let store = SharedStore::connect("redis://127.0.0.1:6379", "broker:", TIMEOUT).unwrap();
        assert_eq!(store.key("credential:c1"), "broker:credential:c1");
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = SharedStore::connect("not-a-redis-url", "p:", TIMEOUT).err().unwrap();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_surfaces_error() {
        let store = SharedStore::connect("redis://127.0.0.1:1", "p:", TIMEOUT).unwrap();
        assert!(store.ping().await.is_err());
        assert!(store.get::<String>("k").await.is_err());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts connections and never writes a byte back.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = SharedStore::connect(&format!("redis://{addr}"), "p:", TIMEOUT).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), store.get::<String>("k"))
            .await
            .expect("store call must finish on its own");
        assert!(outcome.is_err());
        assert!(tokio::time::timeout(Duration::from_secs(5), store.ping()).await.unwrap().is_err());
    }
}
