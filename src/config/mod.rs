//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BrokerConfig (validated, immutable)
//!     → handed to strategy / cache / breaker constructors
//! ```
//!
//! # Design Decisions
//! - Config is read once at construction; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BrokerConfig;
pub use schema::BreakerConfig;
pub use schema::CacheConfig;
pub use schema::GatewayConfig;
pub use schema::ObservabilityConfig;
pub use schema::RetryConfig;
