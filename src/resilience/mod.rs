//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! GatewayAdapter operation:
//!     → registry.rs (pick the operation's breaker, apply its fallback)
//!     → circuit_breaker.rs (admission gate, deadline race, outcome recording)
//!         → window.rs (bucketed counters over the rolling window)
//!         → timeouts.rs (deadline on the whole action)
//!     → retries.rs + backoff.rs (inside the action, around each HTTP call)
//! ```
//!
//! # Design Decisions
//! - Retries sit inside the breaker: only the exhausted outcome is visible to it
//! - Only timeouts, transport failures and 5xx are retried
//! - Breakers are owned by an explicitly constructed registry, never global

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod retries;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerError, BreakerStats, CircuitBreaker, CircuitStatus, Operation};
pub use registry::CircuitBreakerRegistry;
pub use retries::RetryPolicy;
