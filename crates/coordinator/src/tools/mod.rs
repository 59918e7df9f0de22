//! Tool catalogue types.
//!
//! A tool is a [`ToolDescriptor`] (what listing and the visibility policy
//! see) paired with a [`ToolHandler`] (what invocation runs). The policy
//! only ever reads the descriptor.

pub mod coordination;
pub mod local;

use async_trait::async_trait;
use hive_common::{HiveError, Result};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Static visibility tag of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolVisibility {
    /// Touches the local filesystem, processes or editor
    LocalOnly,
    /// Safe for any connection
    RemoteSafe,
}

/// Where a tool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Coordination,
    Local,
    /// Forwarded to an upstream MCP server
    Proxied,
}

/// Listing-side description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub visibility: ToolVisibility,
    pub category: ToolCategory,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        visibility: ToolVisibility,
        category: ToolCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            visibility,
            category,
        }
    }
}

/// Executes a tool call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value>;
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolEntry {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolEntry {
    pub fn new(descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            descriptor,
            handler,
        }
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Deserialize tool arguments into a typed request.
///
/// A missing or `null` argument object is treated as `{}`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|e| HiveError::Validation(format!("{}: {}", tool, e)))
}

/// JSON schema of a request type, as sent in `inputSchema`.
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}
