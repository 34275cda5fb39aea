//! Gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → adapter.rs (cache, breaker and fallback orchestration)
//!     → strategy (URL shape, auth headers, prerequisites)
//!     → client.rs (HTTP with per-attempt timeout and retry)
//!     → types.rs (payload decoding, error classification)
//! ```

pub mod adapter;
pub mod client;
pub mod types;

pub use adapter::GatewayAdapter;
pub use client::GatewayClient;
pub use types::{Credential, GatewayError, GatewayResult, HealthReport};
