//! Timestamped cache entries.

use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its creation and expiry instants.
///
/// `expires_at` is always strictly after `created_at`; a zero TTL is bumped
/// to one millisecond.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        let created_at = Instant::now();
        let ttl = ttl.max(Duration::from_millis(1));
        Self {
            data,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}
