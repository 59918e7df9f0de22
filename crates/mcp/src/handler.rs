//! MCP method dispatcher shared by every transport.
//!
//! A transport owns one [`McpSession`] per connection and feeds each
//! incoming message through [`McpHandler::handle_message`]. The session
//! carries the [`ConnectionContext`] that tool listing and invocation are
//! filtered by.

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use hive_common::ConnectionContext;
use hive_coordinator::ToolRouter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "hive-coordinator";

/// Per-connection protocol state.
#[derive(Debug, Clone)]
pub struct McpSession {
    context: ConnectionContext,
    initialized: bool,
    client_name: Option<String>,
}

impl McpSession {
    pub fn new(context: ConnectionContext) -> Self {
        Self {
            context,
            initialized: false,
            client_name: None,
        }
    }

    pub fn local() -> Self {
        Self::new(ConnectionContext::local())
    }

    pub fn remote() -> Self {
        Self::new(ConnectionContext::remote())
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
struct InitializeParams {
    #[serde(default, rename = "protocolVersion")]
    protocol_version: Option<String>,
    #[serde(default)]
    capabilities: Option<Value>,
    #[serde(default, rename = "clientInfo")]
    client_info: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Declared client capabilities, given either as a list of names or as an
/// MCP capabilities object (whose keys are taken).
fn declared_capabilities(raw: Option<&Value>) -> BTreeSet<String> {
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => BTreeSet::new(),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(params).map_err(JsonRpcError::invalid_params)
}

/// Dispatches JSON-RPC messages to the tool router.
#[derive(Clone)]
pub struct McpHandler {
    router: Arc<ToolRouter>,
}

impl McpHandler {
    pub fn new(router: Arc<ToolRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }

    /// Handle one raw message. Returns `None` for notifications.
    pub async fn handle_message(&self, session: &mut McpSession, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.handle_value(session, value).await,
            Err(e) => {
                warn!(error = %e, "Malformed JSON-RPC message");
                Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error(e)))
            }
        }
    }

    /// Handle one already-parsed message.
    pub async fn handle_value(&self, session: &mut McpSession, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request = match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => request,
            Ok(request) => {
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request(format!(
                        "unsupported jsonrpc version '{}'",
                        request.jsonrpc
                    )),
                ));
            }
            Err(e) => {
                return Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request(e)));
            }
        };
        self.handle_request(session, request).await
    }

    pub async fn handle_request(
        &self,
        session: &mut McpSession,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        debug!(
            method = %request.method,
            connection_type = %session.context.connection_type,
            "Handling JSON-RPC request"
        );

        let Some(id) = request.id else {
            self.handle_notification(session, &request.method);
            return None;
        };

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(session, request.params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools(session)),
            "tools/call" => self.call_tool(session, request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_notification(&self, session: &mut McpSession, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => {
                session.initialized = true;
                debug!("Client initialized");
            }
            other => debug!(method = %other, "Ignoring notification"),
        }
    }

    fn initialize(&self, session: &mut McpSession, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params)?;

        let caps = declared_capabilities(params.capabilities.as_ref());
        session.context = ConnectionContext::new(session.context.connection_type).with_client_capabilities(caps);
        session.client_name = params.client_info.as_ref().map(|c| c.name.clone());

        info!(
            client = session.client_name().unwrap_or("unknown"),
            client_version = params
                .client_info
                .as_ref()
                .and_then(|c| c.version.as_deref())
                .unwrap_or("unknown"),
            requested_protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
            connection_type = %session.context.connection_type,
            security_level = ?session.context.security_level,
            "MCP session initialized"
        );

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "_meta": {
                "context": session.context,
            }
        }))
    }

    fn list_tools(&self, session: &McpSession) -> Value {
        let listing = self.router.list_tools(&session.context);
        json!({
            "tools": listing.tools,
            "_meta": {
                "filter_stats": listing.meta.filter_stats,
                "context": session.context,
            }
        })
    }

    async fn call_tool(&self, session: &McpSession, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params)?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        match self
            .router
            .invoke_tool(&params.name, arguments, &session.context)
            .await
        {
            Ok(result) => {
                let text = serde_json::to_string(&result).map_err(|e| {
                    JsonRpcError::custom(JsonRpcError::INTERNAL_ERROR, e.to_string())
                })?;
                Ok(json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": false,
                }))
            }
            Err(e) => {
                if e.is_recoverable() {
                    debug!(tool = %params.name, error = %e, "Tool call failed");
                } else {
                    warn!(tool = %params.name, error = %e, "Tool call failed");
                }
                Err(JsonRpcError::from(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_coordinator::{Coordinator, CoordinatorConfig, LivenessConfig};

    fn handler() -> McpHandler {
        let coordinator = Arc::new(Coordinator::new(LivenessConfig::default()));
        McpHandler::new(Arc::new(ToolRouter::new(coordinator, &CoordinatorConfig::default())))
    }

    async fn call(h: &McpHandler, session: &mut McpSession, msg: Value) -> Value {
        let response = h.handle_value(session, msg).await.expect("response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_records_capabilities() {
        let h = handler();
        let mut session = McpSession::remote();

        let out = call(
            &h,
            &mut session,
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "clientInfo": { "name": "test-client", "version": "1.0.0" },
                    "capabilities": ["coordination"]
                }
            }),
        )
        .await;

        assert_eq!(out["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(out["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(out["result"]["_meta"]["context"]["security_level"], "standard");
        assert!(session.context().client_capabilities.contains("coordination"));
        assert_eq!(session.client_name(), Some("test-client"));
    }

    #[tokio::test]
    async fn test_initialized_notification_has_no_response() {
        let h = handler();
        let mut session = McpSession::local();
        let out = h
            .handle_message(&mut session, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(out.is_none());
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let h = handler();
        let mut session = McpSession::local();

        let out = h.handle_message(&mut session, "{not json").await.unwrap();
        let out = serde_json::to_value(out).unwrap();
        assert_eq!(out["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert!(out["id"].is_null());

        let out = call(&h, &mut session, json!({ "jsonrpc": "2.0", "id": 2, "method": "bogus" })).await;
        assert_eq!(out["error"]["code"], JsonRpcError::METHOD_NOT_FOUND);

        let out = call(&h, &mut session, json!({ "jsonrpc": "1.0", "id": 3, "method": "ping" })).await;
        assert_eq!(out["error"]["code"], JsonRpcError::INVALID_REQUEST);

        let out = call(&h, &mut session, json!({ "id": 4 })).await;
        assert_eq!(out["error"]["code"], JsonRpcError::INVALID_REQUEST);
        assert_eq!(out["id"], 4);

        let out = call(&h, &mut session, json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {} })).await;
        assert_eq!(out["error"]["code"], JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_null_id_gets_a_response() {
        let h = handler();
        let out = h
            .handle_message(&mut McpSession::local(), r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .await
            .expect("response");
        let out = serde_json::to_value(out).unwrap();
        assert!(out["id"].is_null());
        assert_eq!(out["result"], json!({}));
    }

    #[tokio::test]
    async fn test_ping() {
        let h = handler();
        let out = call(&h, &mut McpSession::remote(), json!({ "jsonrpc": "2.0", "id": "p", "method": "ping" })).await;
        assert_eq!(out["result"], json!({}));
        assert_eq!(out["id"], "p");
    }

    #[tokio::test]
    async fn test_tools_list_filters_by_session() {
        let h = handler();

        let remote = call(&h, &mut McpSession::remote(), json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })).await;
        let stats = &remote["result"]["_meta"]["filter_stats"];
        assert_eq!(stats["connection_type"], "remote");
        assert_eq!(stats["filtered_out"], 4);

        let local = call(&h, &mut McpSession::local(), json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })).await;
        assert_eq!(local["result"]["_meta"]["filter_stats"]["filtered_out"], 0);
        assert_eq!(local["result"]["_meta"]["context"]["connection_type"], "local");
    }

    #[tokio::test]
    async fn test_tools_call_wraps_text_content() {
        let h = handler();
        let mut session = McpSession::remote();

        let out = call(
            &h,
            &mut session,
            json!({
                "jsonrpc": "2.0", "id": 9, "method": "tools/call",
                "params": { "name": "register_agent", "arguments": { "name": "A", "capabilities": ["coding"] } }
            }),
        )
        .await;

        assert_eq!(out["result"]["isError"], false);
        let text = out["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert!(payload["agent_id"].as_str().unwrap().starts_with("agent_"));
    }

    #[tokio::test]
    async fn test_tools_call_forbidden_and_domain_errors() {
        let h = handler();
        let mut session = McpSession::remote();

        let out = call(
            &h,
            &mut session,
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": { "name": "run_in_terminal", "arguments": { "command": "ls" } }
            }),
        )
        .await;
        assert_eq!(out["error"]["code"], JsonRpcError::FORBIDDEN);
        assert_eq!(out["error"]["data"]["code"], "FORBIDDEN");

        let out = call(
            &h,
            &mut session,
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": { "name": "heartbeat", "arguments": { "agent_id": "agent_ghost" } }
            }),
        )
        .await;
        assert_eq!(out["error"]["code"], JsonRpcError::SERVER_ERROR);
        assert_eq!(out["error"]["data"]["code"], "NOT_FOUND");
    }

    #[test]
    fn test_declared_capabilities_shapes() {
        let list = declared_capabilities(Some(&json!(["a", "b", 3])));
        assert_eq!(list.len(), 2);
        let object = declared_capabilities(Some(&json!({ "sampling": {}, "roots": {} })));
        assert!(object.contains("roots"));
        assert!(declared_capabilities(None).is_empty());
    }
}
