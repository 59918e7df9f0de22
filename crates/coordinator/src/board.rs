//! Task board: task records plus the priority-ordered pending queue.

use crate::matcher::eligible;
use hive_common::{HiveError, Result, Task, TaskPriority, TaskState};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

/// Position in the pending queue: higher priority first, then creation
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<TaskPriority>,
    seq: u64,
    task_id: String,
}

/// Task counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub assigned: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: HashMap<String, Task>,
    /// Creation sequence number per task, kept across requeues
    seq: HashMap<String, u64>,
    pending: BTreeSet<QueueKey>,
    next_seq: u64,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created Pending task and enqueue it.
    pub fn insert(&mut self, task: Task) -> String {
        let id = task.task_id.clone();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.pending.insert(QueueKey {
            priority: Reverse(task.priority),
            seq,
            task_id: id.clone(),
        });
        self.seq.insert(id.clone(), seq);
        self.tasks.insert(id.clone(), task);
        id
    }

    pub fn get(&self, task_id: &str) -> Result<&Task> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| HiveError::TaskNotFound(task_id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| HiveError::TaskNotFound(task_id.to_string()))
    }

    /// First pending task, in priority then FIFO order, that an agent with
    /// `agent_caps` qualifies for.
    pub fn next_eligible(&self, agent_caps: &BTreeSet<String>) -> Option<&Task> {
        self.pending
            .iter()
            .filter_map(|key| self.tasks.get(&key.task_id))
            .find(|task| eligible(&task.required_capabilities, agent_caps))
    }

    /// Move a pending task to Assigned and drop it from the queue.
    pub(crate) fn assign(&mut self, task_id: &str, agent_id: &str, now: u64) -> Result<&Task> {
        let key = self.queue_key(task_id)?;
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HiveError::TaskNotFound(task_id.to_string()))?;
        task.assign(agent_id, now)?;
        self.pending.remove(&key);
        Ok(task)
    }

    /// Put an Assigned task back in the queue at its original position.
    pub(crate) fn requeue(&mut self, task_id: &str) -> Result<()> {
        let key = self.queue_key(task_id)?;
        self.get_mut(task_id)?.requeue()?;
        self.pending.insert(key);
        Ok(())
    }

    fn queue_key(&self, task_id: &str) -> Result<QueueKey> {
        let task = self.get(task_id)?;
        let seq = *self
            .seq
            .get(task_id)
            .ok_or_else(|| HiveError::TaskNotFound(task_id.to_string()))?;
        Ok(QueueKey {
            priority: Reverse(task.priority),
            seq,
            task_id: task_id.to_string(),
        })
    }

    /// Pending task IDs in scheduling order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|k| k.task_id.clone()).collect()
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts {
            total: self.tasks.len(),
            ..Default::default()
        };
        for task in self.tasks.values() {
            match task.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Assigned => counts.assigned += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
