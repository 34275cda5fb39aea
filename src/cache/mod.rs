//! Credential caching subsystem.
//!
//! # Data Flow
//! ```text
//! Normal read:   adapter → manager.rs → active primary store
//!                                         ├── local.rs  (bounded DashMap)
//!                                         └── shared.rs (Redis)
//! Fresh value:   adapter → primary store, then stale store
//! Breaker fallback: registry → manager.rs → stale store (always local)
//! ```
//!
//! # Design Decisions
//! - Exactly one primary store is active; switching is an atomic pointer swap
//! - The stale store never serves the normal read path
//! - Shared-store failures degrade to cache misses, never to errors

pub mod entry;
pub mod local;
pub mod manager;
pub mod shared;

use thiserror::Error;

pub use entry::CacheEntry;
pub use manager::{CacheManager, CacheStats};

/// Errors raised by cache stores.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    Configuration(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Shared cache call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Cache has been shut down")]
    Closed,
}
