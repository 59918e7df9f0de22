//! Agent records held by the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Liveness/work status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
}

/// A registered worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID, fixed at registration
    pub agent_id: String,

    /// Display name (not unique)
    pub name: String,

    /// Declared capability tags
    pub capabilities: BTreeSet<String>,

    pub status: AgentStatus,

    /// Back-reference to the task this agent holds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,

    /// Last heartbeat (Unix millis)
    pub last_heartbeat: u64,

    /// Registration time (Unix millis)
    pub registered_at: u64,

    #[serde(default)]
    pub completed_count: u64,

    #[serde(default)]
    pub failed_count: u64,
}

impl Agent {
    pub fn new<I, S>(name: impl Into<String>, capabilities: I, now: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id: format!("agent_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            status: AgentStatus::Idle,
            current_task: None,
            last_heartbeat: now,
            registered_at: now,
            completed_count: 0,
            failed_count: 0,
        }
    }

    /// Whether the last heartbeat is older than `staleness_ms` at `now`.
    pub fn is_stale(&self, now: u64, staleness_ms: u64) -> bool {
        now.saturating_sub(self.last_heartbeat) > staleness_ms
    }

    /// Tasks assigned to this agent and not yet finished.
    pub fn pending_count(&self) -> u64 {
        u64::from(self.current_task.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_creation() {
        let agent = Agent::new("Coder", ["coding", "testing"], 100);

        assert!(agent.agent_id.starts_with("agent_"));
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.current_task.is_none());
        assert_eq!(agent.last_heartbeat, 100);
        assert!(agent.capabilities.contains("coding"));
        assert_eq!(agent.pending_count(), 0);
    }

    #[test]
    fn test_staleness_is_strictly_greater() {
        let agent = Agent::new("a", Vec::<String>::new(), 1_000);
        assert!(!agent.is_stale(1_500, 500));
        assert!(agent.is_stale(1_501, 500));
        // Clock skew backwards never reads as stale
        assert!(!agent.is_stale(10, 500));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&AgentStatus::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
    }
}
