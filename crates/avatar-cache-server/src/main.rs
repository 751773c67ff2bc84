//! Avatar cache server
//!
//! Opens the two-tier avatar cache and exposes health and administration
//! endpoints for it.

mod error;
mod server;
mod types;

use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServerConfig;
use avatar_cache::AvatarCache;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("avatar_cache=info".parse()?)
        .add_directive("avatar_cache_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting avatar cache server...");

    let config = ServerConfig::from_env();
    info!("Port: {}", config.port);
    info!("Cache enabled: {}", config.cache_enabled);
    info!("Cache dir: {:?}", config.cache.directory);
    info!(
        "Max cache size: {} MB",
        config.cache.max_total_bytes / (1024 * 1024)
    );
    info!("Cache TTL: {} seconds", config.cache.max_age.as_secs());
    if config.api_token.is_none() && config.cache_api_token.is_none() {
        warn!("No API token configured, cache administration is open");
    }

    let cache = if config.cache_enabled {
        let cache = AvatarCache::open(config.cache.clone())
            .await
            .inspect_err(|e| error!(error = %e, "Failed to open cache"))?;
        Some(cache)
    } else {
        None
    };

    let state: SharedState = Arc::new(ServerState::new(
        cache,
        config.api_token.clone(),
        config.cache_api_token.clone(),
    ));

    start_server(state.clone(), config.port, shutdown_signal()).await?;

    if let Some(cache) = &state.cache {
        cache.shutdown().await;
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
