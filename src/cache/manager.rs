//! Unified cache front for the broker.
//!
//! # Responsibilities
//! - Route reads/writes to the active primary store (local or Redis)
//! - Keep an always-local stale store for breaker fallbacks
//! - Swap the primary store at runtime without tearing in-flight calls
//! - Report hit/miss statistics and store health

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache::local::LocalStore;
use crate::cache::shared::SharedStore;
use crate::cache::CacheError;
use crate::config::CacheConfig;
use crate::observability::metrics;

/// How long a replaced store may keep serving in-flight calls before its
/// resources are released anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Primary backing strategy.
enum PrimaryStore<T> {
    Local(LocalStore<T>),
    Shared(SharedStore),
}

/// A primary store together with the config it was built from, swapped as one.
struct ActiveStore<T> {
    store: PrimaryStore<T>,
    config: CacheConfig,
}

impl<T: Clone> ActiveStore<T> {
    fn build(config: CacheConfig) -> Result<Self, CacheError> {
        let store = if config.high_availability {
            let store =
                SharedStore::connect(&config.redis_url, &config.key_prefix, config.timeout())?;
            PrimaryStore::Shared(store)
        } else {
            PrimaryStore::Local(LocalStore::bounded(config.max_entries))
        };
        Ok(Self { store, config })
    }

    fn strategy(&self) -> &'static str {
        match self.store {
            PrimaryStore::Local(_) => "local",
            PrimaryStore::Shared(_) => "redis",
        }
    }

    fn release(&self) {
        match &self.store {
            PrimaryStore::Local(store) => store.clear(),
            PrimaryStore::Shared(store) => store.close(),
        }
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub strategy: &'static str,
    /// Entry count of the primary store; unknown for the shared store.
    pub size: Option<usize>,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub errors: u64,
    pub stale_size: usize,
    pub stale_hits: u64,
    pub stale_misses: u64,
}

pub struct CacheManager<T> {
    active: ArcSwap<ActiveStore<T>>,
    stale: LocalStore<T>,
    swap_lock: Mutex<()>,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    stale_hits: AtomicU64,
    stale_misses: AtomicU64,
}

impl<T> CacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Build the cache. Fails only when the shared store cannot be configured.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let active = ActiveStore::build(config)?;
        tracing::info!(
            strategy = active.strategy(),
            ttl_secs = active.config.ttl_secs,
            max_entries = active.config.max_entries,
            "Cache initialized"
        );
        Ok(Self {
            active: ArcSwap::from_pointee(active),
            stale: LocalStore::unbounded(),
            swap_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            stale_misses: AtomicU64::new(0),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn record_error(&self, op: &str, key: &str, err: &CacheError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(op, key = %key, error = %err, "Shared cache operation failed");
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        let active = self.active.load_full();
        let value = match &active.store {
            PrimaryStore::Local(store) => store.get(key),
            PrimaryStore::Shared(store) => match store.get(key).await {
                Ok(value) => value,
                Err(err) => {
                    self.record_error("get", key, &err);
                    None
                }
            },
        };

        let hit = value.is_some();
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_request("primary", hit);
        value
    }

    /// Store `value` in the primary store; `ttl` defaults to the configured TTL.
    pub async fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
        if self.is_closed() {
            return;
        }
        let active = self.active.load_full();
        let ttl = ttl.unwrap_or_else(|| active.config.ttl());
        match &active.store {
            PrimaryStore::Local(store) => {
                store.set(key, value, ttl);
                metrics::record_cache_entries("primary", store.len());
            }
            PrimaryStore::Shared(store) => {
                if let Err(err) = store.set(key, &value, ttl).await {
                    self.record_error("set", key, &err);
                }
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        if self.is_closed() {
            return;
        }
        let active = self.active.load_full();
        match &active.store {
            PrimaryStore::Local(store) => {
                store.delete(key);
            }
            PrimaryStore::Shared(store) => {
                if let Err(err) = store.delete(key).await {
                    self.record_error("delete", key, &err);
                }
            }
        }
    }

    /// Empty the primary store. The stale store is left untouched.
    pub async fn clear(&self) {
        if self.is_closed() {
            return;
        }
        let active = self.active.load_full();
        match &active.store {
            PrimaryStore::Local(store) => store.clear(),
            PrimaryStore::Shared(store) => match store.clear().await {
                Ok(removed) => tracing::info!(removed, "Shared cache cleared"),
                Err(err) => self.record_error("clear", "*", &err),
            },
        }
    }

    /// Read from the stale store. Only breaker fallbacks should call this.
    pub fn get_stale(&self, key: &str) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        let value = self.stale.get(key);
        if value.is_some() {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stale_misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_request("stale", value.is_some());
        value
    }

    /// Store in the stale store; `ttl` defaults to the stale tolerance window.
    pub fn set_stale(&self, key: &str, value: T, ttl: Option<Duration>) {
        if self.is_closed() {
            return;
        }
        let ttl = ttl.unwrap_or_else(|| self.active.load().config.stale_ttl());
        self.stale.set(key, value, ttl);
        metrics::record_cache_entries("stale", self.stale.len());
    }

    pub fn delete_stale(&self, key: &str) {
        self.stale.delete(key);
    }

    pub fn clear_stale(&self) {
        self.stale.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let active = self.active.load();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let (size, evictions) = match &active.store {
            PrimaryStore::Local(store) => (Some(store.len()), store.evictions()),
            PrimaryStore::Shared(_) => (None, 0),
        };
        CacheStats {
            strategy: active.strategy(),
            size,
            max_entries: active.config.max_entries,
            hits,
            misses,
            hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
            evictions,
            errors: self.errors.load(Ordering::Relaxed),
            stale_size: self.stale.len(),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            stale_misses: self.stale_misses.load(Ordering::Relaxed),
        }
    }

    /// Probe the active primary store.
    pub async fn is_healthy(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let active = self.active.load_full();
        match &active.store {
            PrimaryStore::Local(_) => true,
            PrimaryStore::Shared(store) => match store.ping().await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "Shared cache health probe failed");
                    false
                }
            },
        }
    }

    /// Replace the primary store.
    ///
    /// The new store starts serving before the old one is released. Calls
    /// already running keep their handle on the old store and finish against
    /// it; its resources are freed once they are done (or after a grace period).
    pub async fn reconfigure(&self, config: CacheConfig) -> Result<(), CacheError> {
        let _guard = self.swap_lock.lock().await;
        if self.is_closed() {
            return Err(CacheError::Closed);
        }

        let next = Arc::new(ActiveStore::build(config)?);
        let strategy = next.strategy();
        let previous = self.active.swap(next);
        tracing::info!(from = previous.strategy(), to = strategy, "Cache store swapped");

        drain(previous, 1).await;
        Ok(())
    }

    /// Release every held resource. Further calls are no-ops or misses.
    pub async fn shutdown(&self) {
        let _guard = self.swap_lock.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // one count for this handle, one for the swap cell itself
        drain(self.active.load_full(), 2).await;
        self.stale.clear();
        tracing::info!("Cache shut down");
    }
}

/// Wait until only `owners` references to `store` remain, then release it.
async fn drain<T: Clone>(store: Arc<ActiveStore<T>>, owners: usize) {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while Arc::strong_count(&store) > owners && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL).await;
    }
    if Arc::strong_count(&store) > owners {
        tracing::warn!(
            strategy = store.strategy(),
            "Releasing cache store with calls still in flight"
        );
    }
    store.release();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> CacheConfig {
        CacheConfig {
            ttl_secs: 60,
            max_entries: 100,
            stale_data_tolerance_minutes: 10,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_and_expiry() {
        let cache = CacheManager::<String>::new(local_config()).unwrap();
        cache.set("k", "v".into(), None).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_delete_and_clear_leave_stale_alone() {
        let cache = CacheManager::<String>::new(local_config()).unwrap();
        cache.set("a", "1".into(), None).await;
        cache.set("b", "2".into(), None).await;
        cache.set_stale("a", "1".into(), None);

        cache.delete("a").await;
        assert_eq!(cache.get("a").await, None);

        cache.clear().await;
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get_stale("a").as_deref(), Some("1"));

        cache.clear_stale();
        assert_eq!(cache.get_stale("a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outlives_primary() {
        let cache = CacheManager::<String>::new(local_config()).unwrap();
        cache.set("k", "v".into(), None).await;
        cache.set_stale("k", "v".into(), None);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_stale("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert_eq!(cache.get_stale("k"), None);
    }

    #[tokio::test]
    async fn test_stats_track_hit_rate() {
        let cache = CacheManager::<u32>::new(local_config()).unwrap();
        cache.set("k", 1, None).await;
        cache.get("k").await;
        cache.get("k").await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats();
        assert_eq!(stats.strategy, "local");
        assert_eq!(stats.size, Some(1));
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reconfigure_swaps_store() {
        let cache = CacheManager::<u32>::new(local_config()).unwrap();
        cache.set("k", 1, None).await;

        let mut next = local_config();
        next.max_entries = 5;
        cache.reconfigure(next).await.unwrap();

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().max_entries, 5);
        cache.set("k", 2, None).await;
        assert_eq!(cache.get("k").await, Some(2));
    }

    #[tokio::test]
    async fn test_failed_reconfigure_keeps_current_store() {
        let cache = CacheManager::<u32>::new(local_config()).unwrap();
        cache.set("k", 1, None).await;

        let mut next = local_config();
        next.high_availability = true;
        next.redis_url = "not-a-redis-url".into();
        assert!(cache.reconfigure(next).await.is_err());

        assert_eq!(cache.get("k").await, Some(1));
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let cache = CacheManager::<u32>::new(local_config()).unwrap();
        cache.set("k", 1, None).await;
        cache.set_stale("k", 1, None);
        assert!(cache.is_healthy().await);

        cache.shutdown().await;
        assert!(!cache.is_healthy().await);
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_stale("k"), None);
        assert!(matches!(cache.reconfigure(local_config()).await, Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_unreachable_shared_store_degrades_to_miss() {
        let config = CacheConfig {
            high_availability: true,
            redis_url: "redis://127.0.0.1:1".into(),
            ..local_config()
        };
        let cache = CacheManager::<u32>::new(config).unwrap();
        cache.set("k", 1, None).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.is_healthy().await);

        let stats = cache.stats();
        assert_eq!(stats.strategy, "redis");
        assert_eq!(stats.size, None);
        assert_eq!(stats.errors, 2);
    }
}
