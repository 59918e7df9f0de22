//! Error types for Hive.

use crate::context::ConnectionType;
use crate::task::TaskState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent {0} has no active task")]
    NoActiveTask(String),

    /// A task state change the lifecycle does not allow. Seeing this means
    /// the engine's serialization boundary was bypassed.
    #[error("Invalid transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Tool '{tool}' is not available for {connection_type} connections")]
    Forbidden {
        tool: String,
        connection_type: ConnectionType,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HiveError {
    /// Stable machine-readable code used by every transport.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentNotFound(_) | Self::TaskNotFound(_) => "NOT_FOUND",
            Self::NoActiveTask(_) => "NO_ACTIVE_TASK",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::UnknownTool(_) => "UNKNOWN_TOOL",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Tool(_) => "TOOL_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether a client can act on this error (register first, re-poll,
    /// pick another tool) rather than treat it as a server fault.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidTransition { .. } | Self::Io(_) | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HiveError>;
