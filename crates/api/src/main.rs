//! Hive API server binary.
//!
//! Usage:
//!   hive-api
//!   hive-api --port 8080 --bind 0.0.0.0
//!   hive-api --config hive.toml --trust-local
//!
//! # Environment Variables
//!
//! - `HIVE_API_KEY` - Bearer key for every route except /health
//! - `HIVE_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `HIVE_CORS_ORIGINS` - CORS allowed origins (comma-separated)
//! - `HIVE_CONFIG` - Coordinator config file

use clap::Parser;
use hive_api::{serve, ApiConfig, ApiKeyConfig, AppState};
use hive_coordinator::{Coordinator, CoordinatorConfig, ToolRouter};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hive_api=debug,hive_coordinator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ApiConfig::parse();
    let addr = args.socket_addr()?;

    if args.binds_all_interfaces() {
        tracing::warn!(
            "Server binding to all interfaces. Ensure HIVE_API_KEY is set and a firewall is in place."
        );
    }
    if args.trust_local {
        tracing::warn!("--trust-local set: HTTP clients get filesystem and terminal tools");
    }

    let config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            CoordinatorConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            CoordinatorConfig::default()
        }
    };

    let coordinator = Arc::new(Coordinator::new(config.liveness.clone()));
    coordinator.spawn_liveness_sweeper();

    let router = Arc::new(ToolRouter::new(coordinator.clone(), &config));
    let proxied = router.connect_upstreams(&config.upstream).await;
    tracing::info!(tools = router.len(), proxied, "Tool catalogue ready");

    let mut state = AppState::new(router.clone())
        .trust_local(args.trust_local)
        .with_cors_origins(args.cors_origins.clone());

    match &args.api_key {
        Some(key) => {
            state = state.with_api_key(ApiKeyConfig::new(key.clone()));
            tracing::info!("API key authentication enabled");
        }
        None => tracing::warn!(
            "HIVE_API_KEY not set; API will run without authentication. \
             Acceptable for local development only."
        ),
    }

    serve(Arc::new(state), addr, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    router.shutdown();
    coordinator.close();
    Ok(())
}
