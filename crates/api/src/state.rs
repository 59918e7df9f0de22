//! Application state for the API server.

use crate::auth::ApiKeyConfig;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use hive_common::{ConnectionContext, ConnectionType};
use hive_coordinator::{Coordinator, ToolRouter};
use hive_mcp::{McpHandler, McpSession};
use std::sync::Arc;

/// Shared application state for the API server.
pub struct AppState {
    /// Tool catalogue shared with the JSON-RPC handler
    pub router: Arc<ToolRouter>,

    /// Dispatcher for `POST /mcp` and WebSocket sessions
    pub mcp: McpHandler,

    /// Per-IP request, connection and WebSocket limits
    pub rate_limiter: Arc<RateLimiter>,

    /// Bearer key; `None` disables authentication
    pub api_key: Option<ApiKeyConfig>,

    /// Allowed CORS origins; `None` allows any origin
    pub cors_origins: Option<Vec<String>>,

    /// Connection type every HTTP and WebSocket session gets
    pub connection_type: ConnectionType,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create state around a router. Sessions are remote by default.
    pub fn new(router: Arc<ToolRouter>) -> Self {
        Self {
            mcp: McpHandler::new(router.clone()),
            router,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
            api_key: None,
            cors_origins: None,
            connection_type: ConnectionType::Remote,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_api_key(mut self, config: ApiKeyConfig) -> Self {
        self.api_key = Some(config);
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(config));
        self
    }

    pub fn with_cors_origins(mut self, origins: Option<Vec<String>>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Treat HTTP and WebSocket clients as local, exposing local-only tools.
    pub fn trust_local(mut self, trusted: bool) -> Self {
        self.connection_type = if trusted {
            ConnectionType::Local
        } else {
            ConnectionType::Remote
        };
        self
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        self.router.coordinator()
    }

    /// Context for a single stateless HTTP request.
    pub fn connection_context(&self) -> ConnectionContext {
        ConnectionContext::new(self.connection_type)
    }

    /// Fresh JSON-RPC session for a request or WebSocket connection.
    pub fn new_session(&self) -> McpSession {
        McpSession::new(self.connection_context())
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
