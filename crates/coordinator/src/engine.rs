//! Coordination engine.
//!
//! The [`Coordinator`] owns the agent registry and the task board behind a
//! single `RwLock`. Every read-modify-write sequence (assignment,
//! completion, failure, liveness sweep) runs under the write half, so
//! concurrent callers observe serializable behavior: a task is handed out
//! at most once and a completion never interleaves with a requeue.
//!
//! Nothing here awaits while the lock is held; all operations are
//! in-memory and return promptly.

use crate::board::{TaskBoard, TaskCounts};
use crate::clock::{Clock, SystemClock};
use crate::config::LivenessConfig;
use crate::registry::AgentRegistry;
use hive_common::{Agent, AgentStatus, HiveError, Result, Task, TaskPriority, TaskState};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Input for [`Coordinator::create_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub required_capabilities: BTreeSet<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn requires<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = caps.into_iter().map(Into::into).collect();
        self
    }
}

/// Short reference to the task an agent is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentTaskSummary {
    pub task_id: String,
    pub title: String,
}

/// One agent row of the task board.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub name: String,
    pub status: AgentStatus,
    pub capabilities: BTreeSet<String>,
    pub current_task: Option<CurrentTaskSummary>,
    pub pending_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub last_heartbeat: u64,
}

/// Point-in-time view of the whole board.
#[derive(Debug, Clone, Serialize)]
pub struct TaskBoardSnapshot {
    pub agents: Vec<AgentSummary>,
    pub tasks_summary: TaskCounts,
    /// Pending task IDs in scheduling order
    pub pending_queue: Vec<String>,
    pub generated_at: u64,
}

#[derive(Debug, Default)]
struct BoardState {
    registry: AgentRegistry,
    board: TaskBoard,
}

/// The single authoritative coordinator.
///
/// Construct once at process start and share it as `Arc<Coordinator>` with
/// every transport.
pub struct Coordinator {
    liveness: LivenessConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<BoardState>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(liveness: LivenessConfig) -> Self {
        Self::with_clock(liveness, Arc::new(SystemClock))
    }

    pub fn with_clock(liveness: LivenessConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            staleness_secs = liveness.staleness_secs,
            sweep_interval_secs = liveness.sweep_interval_secs,
            "Initializing Hive coordinator"
        );

        Self {
            liveness,
            clock,
            state: RwLock::new(BoardState::default()),
            sweeper: Mutex::new(None),
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn staleness_ms(&self) -> u64 {
        self.liveness.staleness().as_millis() as u64
    }

    /// Take the write lock and apply any pending liveness requeues first.
    fn write_swept(&self) -> (RwLockWriteGuard<'_, BoardState>, u64) {
        let now = self.now();
        let mut state = self.state.write();
        Self::sweep_locked(&mut state, now, self.staleness_ms());
        (state, now)
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Register a new agent in the Idle state.
    pub fn register_agent<I, S>(&self, name: &str, capabilities: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (mut state, now) = self.write_swept();
        let agent = state.registry.register(name, capabilities, now);

        info!(
            agent_id = %agent.agent_id,
            name = %agent.name,
            capabilities = ?agent.capabilities,
            "Agent registered"
        );
        agent.agent_id.clone()
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        let (state, _) = self.write_swept();
        state.registry.get(agent_id).cloned()
    }

    /// All agents in registration order.
    pub fn list_agents(&self) -> Vec<Agent> {
        let (state, _) = self.write_swept();
        state.registry.iter().cloned().collect()
    }

    /// Refresh an agent's heartbeat.
    ///
    /// Never sweeps and never touches assignments.
    pub fn heartbeat(&self, agent_id: &str) -> Result<AgentStatus> {
        let now = self.now();
        let status = self.state.write().registry.heartbeat(agent_id, now)?;
        debug!(agent_id = %agent_id, ?status, "Heartbeat");
        Ok(status)
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Create a Pending task and enqueue it.
    pub fn create_task(&self, new: NewTask) -> String {
        let (mut state, now) = self.write_swept();
        let task = Task::new(new.title, new.description, now)
            .with_priority(new.priority)
            .with_required_capabilities(new.required_capabilities);

        info!(
            task_id = %task.task_id,
            priority = %task.priority,
            required = ?task.required_capabilities,
            "Task created"
        );
        state.board.insert(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        let (state, _) = self.write_swept();
        state.board.get(task_id).cloned()
    }

    /// Hand the best eligible pending task to an idle agent.
    ///
    /// Returns `Ok(None)` when the agent is unknown, not Idle, or nothing it
    /// qualifies for is pending. None of these change any state.
    pub fn get_next_task(&self, agent_id: &str) -> Result<Option<Task>> {
        let (mut state, now) = self.write_swept();
        let state = &mut *state;

        let caps = match state.registry.get(agent_id) {
            Ok(agent) if agent.status == AgentStatus::Idle => agent.capabilities.clone(),
            Ok(agent) => {
                debug!(agent_id = %agent_id, status = ?agent.status, "Agent not idle, no task");
                return Ok(None);
            }
            Err(_) => {
                debug!(agent_id = %agent_id, "Unknown agent asked for work");
                return Ok(None);
            }
        };

        let Some(task_id) = state.board.next_eligible(&caps).map(|t| t.task_id.clone()) else {
            return Ok(None);
        };

        let task = state
            .board
            .assign(&task_id, agent_id, now)
            .map_err(log_defect)?
            .clone();
        let agent = state.registry.get_mut(agent_id)?;
        agent.status = AgentStatus::Busy;
        agent.current_task = Some(task_id.clone());

        info!(
            task_id = %task_id,
            agent_id = %agent_id,
            priority = %task.priority,
            "Task assigned"
        );
        Ok(Some(task))
    }

    /// Mark the agent's current task Completed.
    pub fn complete_task(&self, agent_id: &str, result: &str) -> Result<String> {
        self.finish_task(agent_id, TaskState::Completed, result)
    }

    /// Mark the agent's current task Failed. The task is terminal; callers
    /// resubmit with a new `create_task`.
    pub fn fail_task(&self, agent_id: &str, reason: &str) -> Result<String> {
        self.finish_task(agent_id, TaskState::Failed, reason)
    }

    fn finish_task(&self, agent_id: &str, outcome: TaskState, text: &str) -> Result<String> {
        let now = self.now();
        let mut state = self.state.write();
        let state = &mut *state;

        // A finishing agent counts as alive; refresh it before sweeping.
        if let Ok(agent) = state.registry.get_mut(agent_id) {
            if agent.status != AgentStatus::Offline {
                agent.last_heartbeat = now;
            }
        }
        Self::sweep_locked(state, now, self.staleness_ms());

        let task_id = state
            .registry
            .get(agent_id)?
            .current_task
            .clone()
            .ok_or_else(|| HiveError::NoActiveTask(agent_id.to_string()))?;

        let task = state.board.get_mut(&task_id).map_err(log_defect)?;
        if task.assigned_agent.as_deref() != Some(agent_id) {
            return Err(log_defect(HiveError::InvalidTransition {
                task_id,
                from: task.state,
                to: outcome,
            }));
        }
        let transition = match outcome {
            TaskState::Failed => task.fail(text, now),
            _ => task.complete(text, now),
        };
        transition.map_err(log_defect)?;

        let agent = state.registry.get_mut(agent_id)?;
        agent.current_task = None;
        agent.status = AgentStatus::Idle;
        agent.last_heartbeat = now;
        match outcome {
            TaskState::Failed => agent.failed_count += 1,
            _ => agent.completed_count += 1,
        }

        info!(task_id = %task_id, agent_id = %agent_id, state = ?outcome, "Task finished");
        Ok(task_id)
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Consistent snapshot of every agent and the task counts.
    ///
    /// Runs under the shared lock; only takes the exclusive lock when a
    /// stale agent still has to be swept.
    pub fn task_board(&self) -> TaskBoardSnapshot {
        let now = self.now();
        let staleness = self.staleness_ms();

        let read = self.state.read();
        if !read.registry.has_stale(now, staleness) {
            return Self::snapshot(&read, now);
        }
        drop(read);

        let mut write = self.state.write();
        Self::sweep_locked(&mut write, now, staleness);
        let read = RwLockWriteGuard::downgrade(write);
        Self::snapshot(&read, now)
    }

    fn snapshot(state: &BoardState, now: u64) -> TaskBoardSnapshot {
        let agents = state
            .registry
            .iter()
            .map(|agent| AgentSummary {
                agent_id: agent.agent_id.clone(),
                name: agent.name.clone(),
                status: agent.status,
                capabilities: agent.capabilities.clone(),
                current_task: agent.current_task.as_ref().map(|id| CurrentTaskSummary {
                    task_id: id.clone(),
                    title: state
                        .board
                        .get(id)
                        .map(|t| t.title.clone())
                        .unwrap_or_default(),
                }),
                pending_tasks: agent.pending_count(),
                completed_tasks: agent.completed_count,
                failed_tasks: agent.failed_count,
                last_heartbeat: agent.last_heartbeat,
            })
            .collect();

        TaskBoardSnapshot {
            agents,
            tasks_summary: state.board.counts(),
            pending_queue: state.board.pending_ids(),
            generated_at: now,
        }
    }

    // ------------------------------------------------------------------
    // Liveness
    // ------------------------------------------------------------------

    /// Mark stale agents Offline and requeue their tasks. Returns the IDs of
    /// requeued tasks.
    pub fn sweep_stale_agents(&self) -> Vec<String> {
        let now = self.now();
        let mut state = self.state.write();
        Self::sweep_locked(&mut state, now, self.staleness_ms())
    }

    fn sweep_locked(state: &mut BoardState, now: u64, staleness_ms: u64) -> Vec<String> {
        let mut requeued = Vec::new();

        for agent_id in state.registry.stale_agents(now, staleness_ms) {
            let Ok(agent) = state.registry.get_mut(&agent_id) else {
                continue;
            };
            agent.status = AgentStatus::Offline;
            let held = agent.current_task.take();
            warn!(
                agent_id = %agent_id,
                last_heartbeat = agent.last_heartbeat,
                "Agent heartbeat stale, marking offline"
            );

            if let Some(task_id) = held {
                match state.board.requeue(&task_id) {
                    Ok(()) => {
                        info!(task_id = %task_id, agent_id = %agent_id, "Task requeued");
                        requeued.push(task_id);
                    }
                    Err(e) => {
                        log_defect(e);
                    }
                }
            }
        }

        requeued
    }

    /// Start the periodic liveness sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the coordinator
    /// is dropped or [`close`](Self::close) is called.
    pub fn spawn_liveness_sweeper(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.liveness.sweep_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                let requeued = coordinator.sweep_stale_agents();
                if !requeued.is_empty() {
                    info!(count = requeued.len(), "Liveness sweep requeued tasks");
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop background work. Safe to call more than once.
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!("Liveness sweeper stopped");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Log an invariant violation as a defect and pass it through.
fn log_defect(err: HiveError) -> HiveError {
    if matches!(err, HiveError::InvalidTransition { .. }) {
        error!(error = %err, "Coordinator invariant violated");
    }
    err
}
