//! HTTP route handlers for the API.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hive_mcp::{PROTOCOL_VERSION, SERVER_NAME};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub agents: usize,
    pub tools: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        agents: state.coordinator().list_agents().len(),
        tools: state.router.len(),
    })
}

/// Server description plus the tools this client may use.
pub async fn capabilities(State(state): State<Arc<AppState>>) -> Json<Value> {
    let context = state.connection_context();
    let listing = state.router.list_tools(&context);

    Json(json!({
        "server": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "protocolVersion": PROTOCOL_VERSION,
        },
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "tools": listing.tools,
        "context": context,
        "_meta": listing.meta,
    }))
}

/// `GET /mcp/tools`
pub async fn list_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.list_tools(&state.connection_context()))
}

/// Body of `POST /mcp/tools/{name}`. An empty body means no arguments.
#[derive(Debug, Default, Deserialize)]
pub struct ToolCallBody {
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    pub result: Value,
}

/// `POST /mcp/tools/{name}`
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolCallResponse>, ApiError> {
    let call: ToolCallBody = if body.iter().all(u8::is_ascii_whitespace) {
        ToolCallBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?
    };

    debug!(tool = %name, "HTTP tool call");
    let arguments = call.arguments.unwrap_or_else(|| json!({}));
    let result = state
        .router
        .invoke_tool(&name, arguments, &state.connection_context())
        .await?;

    Ok(Json(ToolCallResponse { result }))
}

/// `POST /mcp`: one JSON-RPC message per request. Notifications get
/// `202 Accepted` with no body.
pub async fn rpc(State(state): State<Arc<AppState>>, body: String) -> Response {
    let mut session = state.new_session();
    match state.mcp.handle_message(&mut session, &body).await {
        Some(response) => Json(response).into_response(),
        None => {
            info!("JSON-RPC notification accepted");
            StatusCode::ACCEPTED.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            uptime_seconds: 100,
            agents: 2,
            tools: 12,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["tools"], 12);
    }

    #[test]
    fn test_tool_call_body() {
        let body: ToolCallBody =
            serde_json::from_str(r#"{"arguments": {"agent_id": "a"}}"#).unwrap();
        assert_eq!(body.arguments.unwrap()["agent_id"], "a");

        let body: ToolCallBody = serde_json::from_str("{}").unwrap();
        assert!(body.arguments.is_none());
    }
}
