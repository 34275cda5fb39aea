//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resilience, cache, gateway produce:
//!     → tracing events (structured fields: operation, key, status)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, text or JSON)
//!     → Prometheus scrape listener (optional)
//! ```

pub mod logging;
pub mod metrics;
