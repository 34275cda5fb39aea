//! Credential broker library.
//!
//! Issues and caches gateway credentials on behalf of authenticated callers,
//! keeping the gateway admin API behind circuit breakers, retries and a
//! stale-tolerant cache.

pub mod cache;
pub mod config;
pub mod gateway;
pub mod observability;
pub mod resilience;
pub mod strategy;

pub use cache::{CacheManager, CacheStats};
pub use config::BrokerConfig;
pub use gateway::{Credential, GatewayAdapter, GatewayError, HealthReport};
pub use resilience::{CircuitBreakerRegistry, CircuitStatus, Operation};
pub use strategy::{ModeStrategy, Topology};
