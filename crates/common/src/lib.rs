//! Common types shared across the Hive crates.
//!
//! This crate holds the data model the coordinator, the MCP dispatcher and
//! the HTTP gateway all speak: agents, tasks, connection contexts and the
//! error taxonomy.

pub mod agent;
pub mod context;
pub mod error;
pub mod security;
pub mod task;

pub use agent::{Agent, AgentStatus};
pub use context::{ConnectionContext, ConnectionType, SecurityLevel};
pub use error::{HiveError, Result};
pub use task::{Task, TaskPriority, TaskState};

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
