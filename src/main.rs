//! Credential broker CLI.
//!
//! ```text
//!   credential-broker --config broker.toml get <owner>
//!       │
//!       ▼
//!   config (TOML + validation) ──→ logging, metrics exporter
//!       │
//!       ▼
//!   CacheManager ──→ CircuitBreakerRegistry ──→ GatewayAdapter
//!       │
//!       ▼
//!   JSON on stdout, logs on stderr
//! ```

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use credential_broker::config::validation::validate_config;
use credential_broker::config::{load_config, BrokerConfig, ConfigError};
use credential_broker::observability::{logging, metrics};
use credential_broker::{CacheManager, CircuitBreakerRegistry, GatewayAdapter};

#[derive(Parser)]
#[command(name = "credential-broker")]
#[command(about = "Issue and cache gateway credentials", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `gateway.base_url`.
    #[arg(long)]
    base_url: Option<String>,

    /// Override `gateway.token`.
    #[arg(long)]
    token: Option<String>,

    /// Override `gateway.topology` (direct or managed).
    #[arg(long)]
    topology: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an owner's credential (cache first)
    Get { owner_id: String },
    /// Issue a new credential for an owner
    Create { owner_id: String },
    /// Probe the gateway admin API
    Health,
    /// Show cache and circuit breaker statistics
    Stats,
    /// Evict one owner's credential, or the whole primary cache
    Clear { owner_id: Option<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        topology = %config.gateway.topology,
        high_availability = config.cache.high_availability,
        "credential-broker v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                metrics::init_metrics(addr);
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let cache = Arc::new(CacheManager::new(config.cache.clone())?);
    let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone(), cache.clone()));
    let adapter = GatewayAdapter::new(&config.gateway, &config.retries, cache.clone(), breakers)?;

    let output = match cli.command {
        Commands::Get { owner_id } => {
            serde_json::to_value(adapter.get_credential(&owner_id).await)?
        }
        Commands::Create { owner_id } => {
            serde_json::to_value(adapter.create_credential(&owner_id).await)?
        }
        Commands::Health => serde_json::to_value(adapter.health_check().await)?,
        Commands::Stats => json!({
            "cache": adapter.cache_stats(),
            "circuit_breakers": adapter.circuit_breaker_stats(),
        }),
        Commands::Clear { owner_id } => {
            adapter.clear_cache(owner_id.as_deref()).await;
            json!({ "cleared": owner_id.as_deref().unwrap_or("*") })
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    cache.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<BrokerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BrokerConfig::default(),
    };

    if let Some(base_url) = &cli.base_url {
        config.gateway.base_url = base_url.clone();
    }
    if let Some(token) = &cli.token {
        config.gateway.token = token.clone();
    }
    if let Some(topology) = &cli.topology {
        config.gateway.topology = topology.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
