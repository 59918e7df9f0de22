//! Task types and the task lifecycle.

use crate::error::{HiveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Priority level for tasks.
///
/// Ordering follows scheduling precedence: `Urgent` is the greatest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    #[serde(alias = "critical")]
    Urgent,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Assigned,
    Completed,
    Failed,
}

impl TaskState {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal edges: `Pending -> Assigned -> {Completed, Failed}` and the
    /// liveness requeue `Assigned -> Pending`.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Assigned)
                | (Self::Assigned, Self::Completed)
                | (Self::Assigned, Self::Failed)
                | (Self::Assigned, Self::Pending)
        )
    }
}

/// A unit of work tracked by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub task_id: String,

    pub title: String,

    pub description: String,

    pub priority: TaskPriority,

    /// Capability tags an agent must all hold. Empty means any agent.
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,

    pub state: TaskState,

    /// Set only while `state == Assigned`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,

    /// Completion result or failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Number of times the task has been handed to an agent
    #[serde(default)]
    pub attempts: u32,

    /// Creation timestamp (Unix millis)
    pub created_at: u64,

    /// First assignment timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<u64>,

    /// Completion or failure timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, created_at: u64) -> Self {
        Self {
            task_id: format!("task_{}", uuid::Uuid::new_v4()),
            title: title.into(),
            description: description.into(),
            priority: TaskPriority::Normal,
            required_capabilities: BTreeSet::new(),
            state: TaskState::Pending,
            assigned_agent: None,
            result: None,
            attempts: 0,
            created_at,
            assigned_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_required_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(HiveError::InvalidTransition {
                task_id: self.task_id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// `Pending -> Assigned`.
    pub fn assign(&mut self, agent_id: &str, now: u64) -> Result<()> {
        self.transition(TaskState::Assigned)?;
        self.assigned_agent = Some(agent_id.to_string());
        self.assigned_at.get_or_insert(now);
        self.attempts += 1;
        Ok(())
    }

    /// `Assigned -> Completed`.
    pub fn complete(&mut self, result: impl Into<String>, now: u64) -> Result<()> {
        self.finish(TaskState::Completed, result.into(), now)
    }

    /// `Assigned -> Failed`.
    pub fn fail(&mut self, reason: impl Into<String>, now: u64) -> Result<()> {
        self.finish(TaskState::Failed, reason.into(), now)
    }

    fn finish(&mut self, state: TaskState, result: String, now: u64) -> Result<()> {
        self.transition(state)?;
        self.assigned_agent = None;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    /// `Assigned -> Pending`, used only when the holder goes stale.
    pub fn requeue(&mut self) -> Result<()> {
        self.transition(TaskState::Pending)?;
        self.assigned_agent = None;
        Ok(())
    }
}
