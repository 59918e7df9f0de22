//! MCP client for upstream tool servers.
//!
//! Each `[[upstream]]` entry is spawned as a subprocess and spoken to over
//! MCP stdio. Its tools are added to the catalogue and calls are forwarded
//! verbatim.

use crate::config::UpstreamServerConfig;
use crate::tools::ToolHandler;
use async_trait::async_trait;
use hive_common::{HiveError, Result};
use parking_lot::Mutex;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content, RawContent};
use rmcp::service::{Peer, RoleClient};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::ServiceExt;
use serde_json::Value;
use std::borrow::Cow;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// A tool advertised by an upstream server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A connected upstream MCP server.
pub struct UpstreamClient {
    name: String,
    peer: Peer<RoleClient>,
    /// Task that keeps the MCP connection alive
    connection_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl UpstreamClient {
    /// Spawn the server and complete the MCP handshake.
    pub async fn connect(config: &UpstreamServerConfig) -> Result<Self> {
        info!(upstream = %config.name, command = %config.command, "Connecting to upstream MCP server");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let transport = TokioChildProcess::new(&mut cmd).map_err(|e| {
            HiveError::Upstream(format!("Failed to spawn upstream '{}': {}", config.name, e))
        })?;

        // The () handler means we don't handle any server->client requests
        let running = ().serve(transport).await.map_err(|e| {
            HiveError::Upstream(format!(
                "Failed to establish MCP connection with '{}': {}",
                config.name, e
            ))
        })?;

        let peer = running.peer().clone();
        let handle = tokio::spawn(async move {
            let _ = running.waiting().await;
        });

        info!(upstream = %config.name, "Connected to upstream MCP server");
        Ok(Self {
            name: config.name.clone(),
            peer,
            connection_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the upstream tool list.
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let tools = self.peer.list_all_tools().await.map_err(|e| {
            HiveError::Upstream(format!("Failed to list tools from '{}': {}", self.name, e))
        })?;

        let tools: Vec<RemoteTool> = tools
            .iter()
            .filter_map(|tool| remote_tool_from_json(serde_json::to_value(tool).ok()?))
            .collect();

        debug!(
            upstream = %self.name,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Upstream tools"
        );
        Ok(tools)
    }

    /// Forward a tool call.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        debug!(upstream = %self.name, tool = %name, "Calling upstream tool");

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            _ => None,
        };
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };

        let result = self.peer.call_tool(request).await.map_err(|e| {
            HiveError::Upstream(format!("Tool call to '{}' failed: {}", self.name, e))
        })?;
        tool_result_to_value(&result)
    }

    /// Drop the connection. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(handle) = self.connection_handle.lock().take() {
            handle.abort();
            info!(upstream = %self.name, "Upstream connection closed");
        }
    }
}

impl Drop for UpstreamClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn remote_tool_from_json(value: Value) -> Option<RemoteTool> {
    Some(RemoteTool {
        name: value.get("name")?.as_str()?.to_string(),
        description: value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        input_schema: value
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "type": "object" })),
    })
}

/// Extract text content from MCP content array.
fn extract_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Text results that hold JSON are passed on as JSON, anything else as a
/// string.
fn tool_result_to_value(result: &CallToolResult) -> Result<Value> {
    let text = extract_text(&result.content);
    if result.is_error.unwrap_or(false) {
        return Err(HiveError::Upstream(text));
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Handler that forwards one proxied tool.
pub struct UpstreamToolHandler {
    client: Arc<UpstreamClient>,
    tool_name: String,
}

impl UpstreamToolHandler {
    pub fn new(client: Arc<UpstreamClient>, tool_name: impl Into<String>) -> Self {
        Self {
            client,
            tool_name: tool_name.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for UpstreamToolHandler {
    async fn call(&self, arguments: Value) -> Result<Value> {
        self.client.call_tool(&self.tool_name, arguments).await
    }
}
