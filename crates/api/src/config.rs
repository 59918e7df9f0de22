//! Command-line and environment options for the `hive-api` binary.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "hive-api", version, about = "Hive agent coordinator over HTTP and WebSocket")]
pub struct ApiConfig {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Bind address
    #[arg(short, long, env = "HIVE_BIND_ADDR", default_value = "127.0.0.1")]
    pub bind: String,

    /// Path to a coordinator config.toml
    #[arg(short, long, env = "HIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Treat HTTP and WebSocket clients as local (exposes filesystem and
    /// terminal tools)
    #[arg(long)]
    pub trust_local: bool,

    /// Bearer key required on every route except /health
    #[arg(long, env = "HIVE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Allowed CORS origins (comma-separated)
    #[arg(long, env = "HIVE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,
}

impl ApiConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .bind
            .trim_matches(|c| c == '[' || c == ']')
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", self.bind, e))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn binds_all_interfaces(&self) -> bool {
        self.socket_addr()
            .map(|addr| addr.ip().is_unspecified())
            .unwrap_or(false)
    }
}
