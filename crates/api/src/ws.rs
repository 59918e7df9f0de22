//! JSON-RPC over WebSocket.
//!
//! Each text frame carries one JSON-RPC message; each request gets one
//! response frame. A connection keeps a single [`McpSession`] for its
//! lifetime, so `initialize` applies to every later call on it.
//!
//! [`McpSession`]: hive_mcp::McpSession

use crate::error::ApiError;
use crate::rate_limit::WebSocketGuard;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `GET /mcp/ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let Some(guard) = WebSocketGuard::new(state.rate_limiter.clone(), addr.ip()) else {
        warn!(ip = %addr.ip(), "WebSocket limit exceeded");
        return ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many WebSocket connections",
        )
        .into_response();
    };

    ws.on_upgrade(move |socket| async move {
        run_session(socket, state, addr).await;
        drop(guard);
    })
}

async fn run_session(mut socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let mut session = state.new_session();
    info!(peer = %addr, connection_type = %session.context().connection_type, "WebSocket session opened");

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!(peer = %addr, "Ignoring binary frame");
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                error!(peer = %addr, error = %e, "WebSocket error");
                break;
            }
        };

        let Some(response) = state.mcp.handle_message(&mut session, text.as_str()).await else {
            continue;
        };

        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode JSON-RPC response");
                continue;
            }
        };

        if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }

    info!(
        peer = %addr,
        client = session.client_name().unwrap_or("unknown"),
        "WebSocket session closed"
    );
}
