//! Hive MCP: JSON-RPC / Model Context Protocol front end for the
//! coordinator.
//!
//! This crate maps MCP methods onto the shared [`ToolRouter`] and serves
//! them over stdio. The HTTP gateway reuses the same [`McpHandler`] for its
//! `POST /mcp` and WebSocket endpoints.
//!
//! # Methods
//!
//! - `initialize` - Handshake; records declared client capabilities
//! - `notifications/initialized` - Client ready (no response)
//! - `ping` - Liveness check
//! - `tools/list` - Tools visible to this session, with filter stats
//! - `tools/call` - Invoke a tool; result wrapped as text content
//!
//! # Architecture
//!
//! ```text
//! MCP Client (agent)
//!        │
//!        │ JSON lines on stdin/stdout
//!        ▼
//! ┌─────────────────┐
//! │   McpHandler    │ ◄── one McpSession per connection
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   ToolRouter    │ ◄── visibility policy + coordinator
//! └─────────────────┘
//! ```
//!
//! [`ToolRouter`]: hive_coordinator::ToolRouter

pub mod handler;
pub mod jsonrpc;
pub mod stdio;

pub use handler::{McpHandler, McpSession, PROTOCOL_VERSION, SERVER_NAME};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use stdio::{serve_lines, serve_stdio};
