//! Process-local cache store.
//!
//! # Responsibilities
//! - Hold entries in a concurrent map
//! - Expire entries lazily when they are read
//! - Keep the entry count at or under a configured capacity
//!
//! # Design Decisions
//! - Expired entries are purged before any live entry is evicted
//! - Eviction removes the oldest entries first
//! - A store without capacity only ever purges expired entries

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::entry::CacheEntry;

/// Size above which an unbounded store sweeps expired entries.
const UNBOUNDED_SWEEP_AT: usize = 1024;
/// Writes between two sweeps of an unbounded store.
const UNBOUNDED_SWEEP_EVERY: u64 = 256;

#[derive(Debug)]
pub struct LocalStore<T> {
    entries: DashMap<String, CacheEntry<T>>,
    capacity: Option<usize>,
    evictions: AtomicU64,
    writes: AtomicU64,
}

impl<T: Clone> LocalStore<T> {
    /// A store holding at most `capacity` entries.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: Some(capacity.max(1)),
            evictions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// A store that only drops entries once they expire.
    pub fn unbounded() -> Self {
        Self {
            entries: DashMap::new(),
            capacity: None,
            evictions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.data.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        if let Some(capacity) = self.capacity {
            if self.entries.len() > capacity {
                self.evict(capacity);
            }
        } else {
            let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
            if writes % UNBOUNDED_SWEEP_EVERY == 0 && self.entries.len() > UNBOUNDED_SWEEP_AT {
                self.purge_expired();
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict(&self, capacity: usize) {
        self.purge_expired();
        while self.entries.len() > capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(key = %key, "Evicted cache entry at capacity");
                    }
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_lazy_expiry_removes_entry() {
        let store = LocalStore::bounded(10);
        store.set("k", 1, Duration::from_secs(1));
        assert_eq!(store.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k"), None);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let store = LocalStore::bounded(2);
        store.set("a", 1, Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(1)).await;
        store.set("b", 2, Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(1)).await;
        store.set("c", 3, Duration::from_secs(60));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(2));
        assert_eq!(store.get("c"), Some(3));
        assert_eq!(store.evictions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_go_before_live_ones() {
        let store = LocalStore::bounded(2);
        store.set("short", 1, Duration::from_millis(10));
        store.set("long", 2, Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(20)).await;
        store.set("new", 3, Duration::from_secs(60));

        assert_eq!(store.get("long"), Some(2));
        assert_eq!(store.get("new"), Some(3));
        assert_eq!(store.evictions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_store_sweeps_periodically() {
        let store = LocalStore::unbounded();
        for i in 0..1100 {
            store.set(&format!("short{i}"), i, Duration::from_millis(10));
        }
        tokio::time::advance(Duration::from_millis(20)).await;

        // Writes 1101..=1279 leave the expired entries in place.
        for i in 0..179 {
            store.set(&format!("live{i}"), i, Duration::from_secs(60));
        }
        assert_eq!(store.len(), 1279);

        // Write 1280 is a sweep point.
        store.set("live179", 179, Duration::from_secs(60));
        assert_eq!(store.len(), 180);
        assert_eq!(store.get("live0"), Some(0));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let store = LocalStore::unbounded();
        store.set("k", 1, Duration::from_secs(60));
        store.set("k", 2, Duration::from_secs(60));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k"), Some(2));
        assert!(store.delete("k"));
        assert!(store.is_empty());
    }
}
