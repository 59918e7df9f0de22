//! Hive MCP stdio server binary.
//!
//! Run this as a subprocess of an MCP client. Every stdio session is local,
//! so the client sees the full tool catalogue including filesystem and
//! terminal tools.
//!
//! Usage:
//!   hive-mcp-server
//!   hive-mcp-server --config hive.toml

use clap::Parser;
use hive_coordinator::{Coordinator, CoordinatorConfig, ToolRouter};
use hive_mcp::{serve_stdio, McpHandler};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "hive-mcp-server", version, about = "Hive agent coordinator over MCP stdio")]
struct Args {
    /// Path to a coordinator config.toml
    #[arg(short, long, env = "HIVE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol traffic, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hive_mcp=debug,hive_coordinator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

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
    tracing::info!(tools = router.len(), proxied, "Starting Hive MCP server");

    let handler = McpHandler::new(router.clone());
    tokio::select! {
        result = serve_stdio(&handler) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    tracing::info!("Shutting down Hive MCP server");
    router.shutdown();
    coordinator.close();
    Ok(())
}
