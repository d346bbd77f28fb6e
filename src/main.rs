//! meshlink daemon.
//!
//! Loads configuration, wires the four core components together, starts
//! their background tasks, and runs until interrupted.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                COMMUNICATION CORE             │
//!                  │                                               │
//!   publish(event) │  ┌──────────┐      ┌───────────────┐         │
//!   ───────────────┼─▶│  event   │─────▶│    service    │─────────┼──▶ downstream
//!                  │  │   bus    │      │    client     │         │    services
//!                  │  └────┬─────┘      └──┬─────────┬──┘         │
//!                  │       │               │         │            │
//!                  │  ┌────▼─────┐   ┌─────▼────┐ ┌──▼─────────┐  │
//!                  │  │  retry   │   │ breaker  │ │  service   │  │
//!                  │  │  queue   │   │ registry │ │ discovery  │  │
//!                  │  └──────────┘   └──────────┘ └────────────┘  │
//!                  │                                               │
//!                  │  Cross-cutting: config, lifecycle,            │
//!                  │  observability (logging + metrics)            │
//!                  └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use url::Url;

use meshlink::breaker::BreakerRegistry;
use meshlink::bus::EventBus;
use meshlink::client::ServiceClient;
use meshlink::config::loader::load_config;
use meshlink::config::CoreConfig;
use meshlink::discovery::ServiceDiscovery;
use meshlink::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "meshlink", about = "Resilient inter-service communication core")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("meshlink=debug");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => CoreConfig::default(),
    };

    tracing::info!(
        failure_threshold = config.breaker.failure_threshold,
        retry_attempts = config.client.retry_attempts,
        probe_interval_secs = config.discovery.probe_interval_secs,
        drain_interval_secs = config.bus.retry_delay_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
    let discovery = Arc::new(ServiceDiscovery::new(config.discovery.clone()));

    for seed in &config.services {
        let urls: Vec<Url> = seed
            .instances
            .iter()
            .filter_map(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(service = %seed.name, url = raw, error = %e, "Skipping invalid instance URL");
                    None
                }
            })
            .collect();
        discovery.register_service(&seed.name, urls);
    }

    let client = Arc::new(ServiceClient::new(
        config.client.clone(),
        discovery.clone(),
        breakers.clone(),
    ));
    let bus = Arc::new(EventBus::new(config.bus.clone(), client.clone()));

    discovery.start_health_checks();
    bus.start_background_tasks();

    tracing::info!("meshlink v0.1.0 running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    discovery.stop_health_checks();
    bus.stop_background_tasks();

    tracing::info!("Shutdown complete");
    Ok(())
}
