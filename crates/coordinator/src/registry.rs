//! Agent registry.
//!
//! Owns every [`Agent`] record. The registry is a plain data structure: the
//! [`Coordinator`](crate::Coordinator) holds it behind its lock and is the
//! only writer of the `current_task` back-reference.

use hive_common::{Agent, AgentStatus, HiveError, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
    /// Agent IDs in registration order
    order: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent. Names are not unique; every call creates a
    /// fresh agent with its own ID.
    pub fn register<I, S>(&mut self, name: &str, capabilities: I, now: u64) -> &Agent
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let agent = Agent::new(name, capabilities, now);
        let id = agent.agent_id.clone();
        self.order.push(id.clone());
        self.agents.entry(id).or_insert(agent)
    }

    pub fn get(&self, agent_id: &str) -> Result<&Agent> {
        self.agents
            .get(agent_id)
            .ok_or_else(|| HiveError::AgentNotFound(agent_id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, agent_id: &str) -> Result<&mut Agent> {
        self.agents
            .get_mut(agent_id)
            .ok_or_else(|| HiveError::AgentNotFound(agent_id.to_string()))
    }

    /// Refresh an agent's heartbeat.
    ///
    /// Leaves Idle/Busy untouched. An agent already swept Offline holds no
    /// task, so it comes back as Idle.
    pub fn heartbeat(&mut self, agent_id: &str, now: u64) -> Result<AgentStatus> {
        let agent = self.get_mut(agent_id)?;
        agent.last_heartbeat = now;
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Idle;
        }
        Ok(agent.status)
    }

    /// Agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    /// IDs of agents not yet marked Offline whose heartbeat is stale.
    pub fn stale_agents(&self, now: u64, staleness_ms: u64) -> Vec<String> {
        self.iter()
            .filter(|a| a.status != AgentStatus::Offline && a.is_stale(now, staleness_ms))
            .map(|a| a.agent_id.clone())
            .collect()
    }

    pub fn has_stale(&self, now: u64, staleness_ms: u64) -> bool {
        self.agents
            .values()
            .any(|a| a.status != AgentStatus::Offline && a.is_stale(now, staleness_ms))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
