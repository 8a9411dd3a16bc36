//! # Beacon Server
//!
//! Realtime topic messaging server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! beacon
//!
//! # Run with a config file at ./beacon.toml
//! beacon
//!
//! # Run with environment variables
//! BEACON_PORT=4600 BEACON_HOST=0.0.0.0 beacon
//! ```

mod config;
mod hub;
mod metrics;
mod topics;

use anyhow::Result;
use beacon_core::{ChannelManager, OutboundRelay, PushRouter, TopicRegistryBuilder};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Beacon server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Compose the hub: one push router, one registry, built once
    let router = Arc::new(PushRouter::new());
    let registry = TopicRegistryBuilder::new()
        .register::<topics::Chat>()?
        .build(
            Arc::clone(&router) as Arc<dyn OutboundRelay>,
            Arc::clone(&router) as Arc<dyn ChannelManager>,
        );

    let state = Arc::new(hub::AppState {
        router,
        registry,
        config,
    });

    // Start the server
    hub::run_server(state).await?;

    Ok(())
}
