//! Coordination core for Hive.
//!
//! The coordinator is the shared brain every transport talks to:
//! 1. Tracks registered agents and their heartbeats
//! 2. Holds the priority-ordered task board
//! 3. Matches pending tasks to idle agents by capability
//! 4. Decides which tools a connection may see and call
//!
//! # Architecture
//!
//! ```text
//!  stdio        HTTP        WebSocket
//!    │            │             │
//!    └──────┬─────┴──────┬──────┘
//!           ▼            ▼
//!     ┌──────────┐  ┌─────────┐
//!     │ToolRouter│─▶│ policy  │  ◄── ConnectionContext
//!     └────┬─────┘  └─────────┘
//!          │
//!    ┌─────┴──────┬───────────┐
//!    ▼            ▼           ▼
//! [Coordinator] [local]  [upstream MCP]
//!  registry +    tools     servers
//!  task board
//! ```

pub mod board;
pub mod clock;
pub mod config;
pub mod engine;
pub mod matcher;
pub mod policy;
pub mod registry;
pub mod router;
pub mod tools;
pub mod upstream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CoordinatorConfig, LivenessConfig, UpstreamServerConfig};
pub use engine::{AgentSummary, Coordinator, NewTask, TaskBoardSnapshot};
pub use policy::{FilterStats, ToolClassifier};
pub use router::{ToolListing, ToolRouter};
pub use tools::{ToolCategory, ToolDescriptor, ToolEntry, ToolHandler, ToolVisibility};
