//! Integration tests for the API layer.
//!
//! These tests spin up a real HTTP server on a random port so that
//! `ConnectInfo<SocketAddr>` is populated correctly by axum.

use futures::{SinkExt, StreamExt};
use hive_api::{serve_listener, ApiKeyConfig, AppState, RateLimitConfig};
use hive_coordinator::{Coordinator, CoordinatorConfig, LivenessConfig, ToolRouter};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

fn default_state() -> AppState {
    let coordinator = Arc::new(Coordinator::new(LivenessConfig::default()));
    AppState::new(Arc::new(ToolRouter::new(
        coordinator,
        &CoordinatorConfig::default(),
    )))
}

/// Spin up a test server on a random port and return its address.
async fn start_server(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(serve_listener(
        Arc::new(state),
        listener,
        std::future::pending::<()>(),
    ));

    addr.to_string()
}

async fn get(addr: &str, path: &str) -> (u16, Value) {
    let resp = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

async fn post(addr: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{}{}", addr, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

async fn call_tool(addr: &str, tool: &str, arguments: Value) -> (u16, Value) {
    post(addr, &format!("/mcp/tools/{}", tool), json!({ "arguments": arguments })).await
}

fn tool_names(tools: &Value) -> Vec<String> {
    tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Health and discovery
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_server(default_state()).await;
    let (status, body) = get(&addr, "/health").await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tools"], 12);
}

#[tokio::test]
async fn test_remote_listing_hides_local_tools() {
    let addr = start_server(default_state()).await;
    let (status, body) = get(&addr, "/mcp/tools").await;
    assert_eq!(status, 200);

    let names = tool_names(&body["tools"]);
    assert!(names.contains(&"register_agent".to_string()));
    assert!(names.contains(&"get_task_board".to_string()));
    assert!(!names.contains(&"read_file".to_string()));
    assert!(!names.contains(&"run_in_terminal".to_string()));

    let stats = &body["_meta"]["filter_stats"];
    assert_eq!(stats["connection_type"], "remote");
    assert_eq!(stats["total_tools"], 12);
    assert_eq!(stats["filtered_out"], 4);
}

#[tokio::test]
async fn test_capabilities() {
    let addr = start_server(default_state()).await;
    let (status, body) = get(&addr, "/mcp/capabilities").await;

    assert_eq!(status, 200);
    assert_eq!(body["server"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["context"]["connection_type"], "remote");
    assert_eq!(body["tools"].as_array().unwrap().len(), 8);
}

// ============================================================================
// REST tool calls
// ============================================================================

#[tokio::test]
async fn test_forbidden_local_tool() {
    let addr = start_server(default_state()).await;
    let (status, body) = call_tool(&addr, "read_file", json!({ "path": "/etc/hostname" })).await;

    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert!(body["error"]["message"].as_str().unwrap().contains("read_file"));
}

#[tokio::test]
async fn test_unknown_tool() {
    let addr = start_server(default_state()).await;
    let (status, body) = call_tool(&addr, "does_not_exist", json!({})).await;

    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "UNKNOWN_TOOL");
}

#[tokio::test]
async fn test_invalid_arguments() {
    let addr = start_server(default_state()).await;
    let (status, body) = call_tool(&addr, "register_agent", json!({ "capabilities": [] })).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_agent_workflow_over_http() {
    let addr = start_server(default_state()).await;

    let (status, agent) = call_tool(
        &addr,
        "register_agent",
        json!({ "name": "RemoteAgent", "capabilities": ["coding"] }),
    )
    .await;
    assert_eq!(status, 200);
    let agent_id = agent["result"]["agent_id"].as_str().unwrap().to_string();

    let (_, task) = call_tool(
        &addr,
        "create_task",
        json!({ "title": "Refactor", "description": "Split module", "required_capabilities": ["coding"] }),
    )
    .await;
    let task_id = task["result"]["task_id"].as_str().unwrap().to_string();

    let (_, next) = call_tool(&addr, "get_next_task", json!({ "agent_id": agent_id })).await;
    assert_eq!(next["result"]["task"]["task_id"], task_id);

    let (status, done) = call_tool(
        &addr,
        "complete_task",
        json!({ "agent_id": agent_id, "result": "merged" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(done["result"]["task_id"], task_id);

    // Nothing left to complete
    let (status, body) = call_tool(
        &addr,
        "complete_task",
        json!({ "agent_id": agent_id, "result": "again" }),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "NO_ACTIVE_TASK");

    let (_, board) = call_tool(&addr, "get_task_board", json!({})).await;
    assert_eq!(board["result"]["tasks_summary"]["completed"], 1);
    assert_eq!(board["result"]["agents"][0]["completed_tasks"], 1);
}

#[tokio::test]
async fn test_trusted_http_gets_local_tools() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "trusted").unwrap();

    let addr = start_server(default_state().trust_local(true)).await;
    let (status, body) = call_tool(&addr, "read_file", json!({ "path": path })).await;

    assert_eq!(status, 200);
    assert_eq!(body["result"]["content"], "trusted");
}

// ============================================================================
// JSON-RPC over HTTP
// ============================================================================

#[tokio::test]
async fn test_jsonrpc_post() {
    let addr = start_server(default_state()).await;

    let (status, body) = post(
        &addr,
        "/mcp",
        json!({ "jsonrpc": "2.0", "id": 7, "method": "tools/list" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["id"], 7);
    assert!(!tool_names(&body["result"]["tools"]).contains(&"write_file".to_string()));

    let (status, body) = post(
        &addr,
        "/mcp",
        json!({ "jsonrpc": "2.0", "id": 8, "method": "tools/call",
                "params": { "name": "write_file", "arguments": { "path": "/tmp/x", "content": "" } } }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["error"]["code"], -32003);
}

#[tokio::test]
async fn test_jsonrpc_notification_has_no_body() {
    let addr = start_server(default_state()).await;
    let (status, _) = post(
        &addr,
        "/mcp",
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
    )
    .await;
    assert_eq!(status, 202);
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_websocket_session() {
    let addr = start_server(default_state()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/mcp/ws", addr))
        .await
        .unwrap();

    let rpc = |id: u64, method: &str, params: Value| {
        Message::Text(
            json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string(),
        )
    };

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    ws.send(rpc(1, "initialize", json!({ "capabilities": { "tools": {} }, "clientInfo": { "name": "ws-agent" } })))
        .await
        .unwrap();
    let init = next_json(&mut ws).await;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["_meta"]["context"]["connection_type"], "remote");

    ws.send(rpc(2, "tools/list", json!({}))).await.unwrap();
    let list = next_json(&mut ws).await;
    let names = tool_names(&list["result"]["tools"]);
    assert!(names.contains(&"heartbeat".to_string()));
    assert!(!names.contains(&"vscode_create_file".to_string()));

    ws.send(rpc(
        3,
        "tools/call",
        json!({ "name": "register_agent", "arguments": { "name": "ws-agent" } }),
    ))
    .await
    .unwrap();
    let registered = next_json(&mut ws).await;
    let text = registered["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert!(payload["agent_id"].is_string());

    ws.send(rpc(
        4,
        "tools/call",
        json!({ "name": "run_in_terminal", "arguments": { "command": "ls" } }),
    ))
    .await
    .unwrap();
    let denied = next_json(&mut ws).await;
    assert_eq!(denied["id"], 4);
    assert_eq!(denied["error"]["code"], -32003);

    ws.close(None).await.unwrap();
}

// ============================================================================
// Authentication and rate limiting
// ============================================================================

#[tokio::test]
async fn test_api_key_required() {
    let addr = start_server(default_state().with_api_key(ApiKeyConfig::new("s3cret"))).await;

    let (status, _) = get(&addr, "/health").await;
    assert_eq!(status, 200);

    let (status, body) = get(&addr, "/mcp/tools").await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "MISSING_API_KEY");

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{}/mcp/tools", addr))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client
        .get(format!("http://{}/mcp/tools", addr))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_websocket_requires_api_key() {
    let addr = start_server(default_state().with_api_key(ApiKeyConfig::new("s3cret"))).await;

    let denied = tokio_tungstenite::connect_async(format!("ws://{}/mcp/ws", addr)).await;
    assert!(denied.is_err());

    let mut request = format!("ws://{}/mcp/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    ws.send(Message::Text(
        json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string(),
    ))
    .await
    .unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["id"], 1);
}

#[tokio::test]
async fn test_rate_limit() {
    let state = default_state().with_rate_limit(RateLimitConfig {
        max_requests: 3,
        ..Default::default()
    });
    let addr = start_server(state).await;

    for _ in 0..3 {
        let (status, _) = get(&addr, "/health").await;
        assert_eq!(status, 200);
    }

    let (status, body) = get(&addr, "/health").await;
    assert_eq!(status, 429);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
}
