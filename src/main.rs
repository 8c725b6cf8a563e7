//! Edge gateway.
//!
//! Forwards client requests to per-route backends while shielding itself
//! from failing ones with per-target circuit breakers.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     EDGE GATEWAY                      │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│ routing  │───▶│    forwarder     │──┼──▶ Backend
//!                      │  │ server  │    │  table   │    │ (guarded call)   │  │
//!                      │  └────┬────┘    └──────────┘    └────────┬─────────┘  │
//!                      │       │ /health /route                   │            │
//!                      │       ▼                                  ▼            │
//!                      │  ┌──────────────────────────────────────────────────┐ │
//!                      │  │ resilience: DispatchExecutor + Breaker per target│ │
//!                      │  └───────────────────────┬──────────────────────────┘ │
//!                      │                          │ events                     │
//!                      │                          ▼                            │
//!                      │  ┌──────────────────────────────────────────────────┐ │
//!                      │  │ observability: Prometheus metrics, JSON logging  │ │
//!                      │  └──────────────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{self, ConfigError, GatewayConfig};
use edge_gateway::http::GatewayServer;
use edge_gateway::lifecycle::{self, Shutdown};
use edge_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "edge-gateway", version)]
#[command(about = "HTTP edge gateway with per-route circuit breakers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

fn load(args: &Args) -> Result<GatewayConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };

    config::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }

    config::validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load(&args)?;

    logging::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    let handle = if config.observability.metrics_enabled {
        Some(metrics::install()?)
    } else {
        None
    };

    let server = GatewayServer::new(&config, handle)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let signals = lifecycle::spawn_signal_handler(Arc::clone(&shutdown));

    server.run(listener, shutdown.subscribe()).await?;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
