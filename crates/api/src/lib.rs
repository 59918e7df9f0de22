//! HTTP and WebSocket gateway for the Hive coordinator.
//!
//! Remote agents reach the same tool catalogue the stdio server exposes,
//! filtered for a remote connection: coordination tools are available,
//! filesystem and terminal tools are not (unless the server runs with
//! `--trust-local`).
//!
//! # Endpoints
//!
//! - `GET /health` - Health check (never requires a key)
//! - `GET /mcp/capabilities` - Server info, visible tools and session context
//! - `GET /mcp/tools` - Visible tools with filter stats
//! - `POST /mcp/tools/{name}` - Invoke a tool: `{"arguments": {...}}`
//! - `POST /mcp` - One JSON-RPC 2.0 message
//! - `GET /mcp/ws` - JSON-RPC over WebSocket, one message per text frame
//!
//! # Security
//!
//! - Bearer API key on every route except `/health`
//! - Per-IP request window, in-flight and WebSocket limits
//! - Request body size limit (default 1MB)
//!
//! # Architecture
//!
//! ```text
//! Remote agent
//!    │ HTTP / WebSocket
//!    ▼
//! ┌─────────────────┐
//! │   API Gateway   │ ◄── auth, rate limits, remote context
//! │     (Axum)      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │   McpHandler    │ ───► │   ToolRouter    │
//! └─────────────────┘      └─────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::ApiKeyConfig;
pub use config::ApiConfig;
pub use error::ApiError;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use state::AppState;

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let allow_origin = match origins {
        Some(origins) if !origins.iter().any(|o| o == "*") => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %o, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(parsed)
        }
        _ => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.cors_origins.as_deref());
    let body_limit = state.rate_limiter.max_body_size();

    Router::new()
        .route("/health", get(routes::health))
        .route("/mcp", post(routes::rpc))
        .route("/mcp/capabilities", get(routes::capabilities))
        .route("/mcp/tools", get(routes::list_tools))
        .route("/mcp/tools/{name}", post(routes::call_tool))
        .route("/mcp/ws", get(ws::websocket_handler))
        // Layers run bottom-up: auth is checked before rate accounting
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce_rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_listener<F>(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    info!(addr = %listener.local_addr()?, "Starting Hive API server");

    // Client addresses feed the per-IP limits
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(state, listener, shutdown).await
}
