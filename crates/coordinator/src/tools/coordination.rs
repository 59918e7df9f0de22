//! Coordination tools backed by the [`Coordinator`].
//!
//! Every tool here is remote-safe. Arguments are parsed into typed requests
//! and validated before the coordinator sees them.

use super::{parse_args, schema_of, ToolCategory, ToolDescriptor, ToolEntry, ToolHandler, ToolVisibility};
use crate::engine::{Coordinator, NewTask};
use async_trait::async_trait;
use hive_common::{HiveError, Result, TaskPriority};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegisterAgentRequest {
    /// Display name of the agent
    pub name: String,
    /// Capability tags the agent offers
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskRequest {
    /// Short task title
    pub title: String,
    /// What needs to be done
    #[serde(default)]
    pub description: String,
    /// One of low, normal, high, urgent (default normal)
    #[serde(default)]
    pub priority: Option<String>,
    /// Capabilities an agent must hold to take the task
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AgentRequest {
    /// ID returned by register_agent
    pub agent_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTaskRequest {
    /// ID returned by register_agent
    pub agent_id: String,
    /// Outcome of the work
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FailTaskRequest {
    /// ID returned by register_agent
    pub agent_id: String,
    /// Why the task could not be finished
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct TaskBoardRequest {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTaskRequest {
    /// ID returned by create_task
    pub task_id: String,
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(HiveError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_capabilities(field: &str, caps: &[String]) -> Result<()> {
    if caps.iter().any(|c| c.trim().is_empty()) {
        return Err(HiveError::Validation(format!(
            "{} must not contain empty entries",
            field
        )));
    }
    Ok(())
}

fn parse_priority(raw: Option<&str>) -> Result<TaskPriority> {
    match raw {
        None => Ok(TaskPriority::default()),
        Some(p) => serde_json::from_value(Value::String(p.to_ascii_lowercase())).map_err(|_| {
            HiveError::Validation(format!(
                "unknown priority '{}', expected low, normal, high or urgent",
                p
            ))
        }),
    }
}

impl RegisterAgentRequest {
    fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        validate_capabilities("capabilities", &self.capabilities)
    }
}

impl CreateTaskRequest {
    fn into_new_task(self) -> Result<NewTask> {
        require_non_empty("title", &self.title)?;
        validate_capabilities("required_capabilities", &self.required_capabilities)?;
        let priority = parse_priority(self.priority.as_deref())?;

        Ok(NewTask::new(self.title, self.description)
            .priority(priority)
            .requires(self.required_capabilities))
    }
}

/// The built-in coordination tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinationTool {
    RegisterAgent,
    CreateTask,
    GetNextTask,
    CompleteTask,
    FailTask,
    Heartbeat,
    GetTaskBoard,
    GetTask,
}

impl CoordinationTool {
    pub const ALL: [CoordinationTool; 8] = [
        Self::RegisterAgent,
        Self::CreateTask,
        Self::GetNextTask,
        Self::CompleteTask,
        Self::FailTask,
        Self::Heartbeat,
        Self::GetTaskBoard,
        Self::GetTask,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::RegisterAgent => "register_agent",
            Self::CreateTask => "create_task",
            Self::GetNextTask => "get_next_task",
            Self::CompleteTask => "complete_task",
            Self::FailTask => "fail_task",
            Self::Heartbeat => "heartbeat",
            Self::GetTaskBoard => "get_task_board",
            Self::GetTask => "get_task",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::RegisterAgent => "Register a new agent with a set of capabilities",
            Self::CreateTask => "Create a task with a priority and required capabilities",
            Self::GetNextTask => {
                "Assign the highest-priority pending task this agent is eligible for"
            }
            Self::CompleteTask => "Mark the agent's current task as completed",
            Self::FailTask => "Mark the agent's current task as failed",
            Self::Heartbeat => "Report that an agent is still alive",
            Self::GetTaskBoard => "Overview of all agents and task counts",
            Self::GetTask => "Look up a single task by ID",
        }
    }

    fn input_schema(self) -> Value {
        match self {
            Self::RegisterAgent => schema_of::<RegisterAgentRequest>(),
            Self::CreateTask => schema_of::<CreateTaskRequest>(),
            Self::GetNextTask | Self::Heartbeat => schema_of::<AgentRequest>(),
            Self::CompleteTask => schema_of::<CompleteTaskRequest>(),
            Self::FailTask => schema_of::<FailTaskRequest>(),
            Self::GetTaskBoard => schema_of::<TaskBoardRequest>(),
            Self::GetTask => schema_of::<GetTaskRequest>(),
        }
    }

    pub fn descriptor(self) -> ToolDescriptor {
        ToolDescriptor::new(
            self.name(),
            self.description(),
            self.input_schema(),
            ToolVisibility::RemoteSafe,
            ToolCategory::Coordination,
        )
    }
}

/// Runs one coordination tool against a shared coordinator.
pub struct CoordinationHandler {
    tool: CoordinationTool,
    coordinator: Arc<Coordinator>,
}

impl CoordinationHandler {
    pub fn new(tool: CoordinationTool, coordinator: Arc<Coordinator>) -> Self {
        Self { tool, coordinator }
    }

    fn dispatch(&self, arguments: Value) -> Result<Value> {
        let name = self.tool.name();
        let c = &self.coordinator;

        match self.tool {
            CoordinationTool::RegisterAgent => {
                let req: RegisterAgentRequest = parse_args(name, arguments)?;
                req.validate()?;
                let agent_id = c.register_agent(req.name.trim(), req.capabilities);
                Ok(json!({ "agent_id": agent_id }))
            }
            CoordinationTool::CreateTask => {
                let req: CreateTaskRequest = parse_args(name, arguments)?;
                let task_id = c.create_task(req.into_new_task()?);
                Ok(json!({ "task_id": task_id }))
            }
            CoordinationTool::GetNextTask => {
                let req: AgentRequest = parse_args(name, arguments)?;
                require_non_empty("agent_id", &req.agent_id)?;
                let task = c.get_next_task(&req.agent_id)?;
                Ok(json!({ "task": task }))
            }
            CoordinationTool::CompleteTask => {
                let req: CompleteTaskRequest = parse_args(name, arguments)?;
                require_non_empty("agent_id", &req.agent_id)?;
                let task_id = c.complete_task(&req.agent_id, &req.result)?;
                Ok(json!({ "task_id": task_id, "state": "completed" }))
            }
            CoordinationTool::FailTask => {
                let req: FailTaskRequest = parse_args(name, arguments)?;
                require_non_empty("agent_id", &req.agent_id)?;
                let task_id = c.fail_task(&req.agent_id, &req.reason)?;
                Ok(json!({ "task_id": task_id, "state": "failed" }))
            }
            CoordinationTool::Heartbeat => {
                let req: AgentRequest = parse_args(name, arguments)?;
                require_non_empty("agent_id", &req.agent_id)?;
                let status = c.heartbeat(&req.agent_id)?;
                Ok(json!({ "ok": true, "status": status }))
            }
            CoordinationTool::GetTaskBoard => {
                let _: TaskBoardRequest = parse_args(name, arguments)?;
                Ok(serde_json::to_value(c.task_board())?)
            }
            CoordinationTool::GetTask => {
                let req: GetTaskRequest = parse_args(name, arguments)?;
                require_non_empty("task_id", &req.task_id)?;
                Ok(json!({ "task": c.get_task(&req.task_id)? }))
            }
        }
    }
}

#[async_trait]
impl ToolHandler for CoordinationHandler {
    async fn call(&self, arguments: Value) -> Result<Value> {
        self.dispatch(arguments)
    }
}

/// Catalogue entries for every coordination tool.
pub fn coordination_tools(coordinator: &Arc<Coordinator>) -> Vec<ToolEntry> {
    CoordinationTool::ALL
        .into_iter()
        .map(|tool| {
            ToolEntry::new(
                tool.descriptor(),
                Arc::new(CoordinationHandler::new(tool, coordinator.clone())),
            )
        })
        .collect()
}
