//! Integration tests for scheduling, liveness and tool policy.
//!
//! Time is driven by a `ManualClock`, so liveness tests never sleep.

use hive_common::{AgentStatus, ConnectionContext, HiveError, TaskPriority, TaskState};
use hive_coordinator::{
    Coordinator, CoordinatorConfig, LivenessConfig, ManualClock, NewTask, ToolRouter,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn create_test_coordinator() -> (Arc<Coordinator>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(10_000));
    let liveness = LivenessConfig {
        staleness_secs: 90,
        sweep_interval_secs: 15,
    };
    (Arc::new(Coordinator::with_clock(liveness, clock.clone())), clock)
}

// ============================================================================
// Scheduling tests
// ============================================================================

#[test]
fn test_end_to_end_scenario() {
    let (c, _) = create_test_coordinator();

    let a = c.register_agent("A", ["coding"]);
    let t = c.create_task(
        NewTask::new("T", "implement feature")
            .priority(TaskPriority::High)
            .requires(["coding"]),
    );

    let task = c.get_next_task(&a).unwrap().expect("task assigned");
    assert_eq!(task.task_id, t);
    assert_eq!(task.state, TaskState::Assigned);
    assert_eq!(task.assigned_agent.as_deref(), Some(a.as_str()));

    assert_eq!(c.complete_task(&a, "done").unwrap(), t);
    assert_eq!(c.get_task(&t).unwrap().state, TaskState::Completed);

    let board = c.task_board();
    assert_eq!(board.agents.len(), 1);
    assert_eq!(board.agents[0].status, AgentStatus::Idle);
    assert_eq!(board.agents[0].completed_tasks, 1);
    assert_eq!(board.agents[0].pending_tasks, 0);
}

#[test]
fn test_priority_then_fifo() {
    let (c, _) = create_test_coordinator();
    let a = c.register_agent("A", Vec::<String>::new());

    let low = c.create_task(NewTask::new("low", "").priority(TaskPriority::Low));
    let urgent = c.create_task(NewTask::new("urgent", "").priority(TaskPriority::Urgent));
    let n1 = c.create_task(NewTask::new("n1", ""));
    let n2 = c.create_task(NewTask::new("n2", ""));

    let mut order = Vec::new();
    while let Some(task) = c.get_next_task(&a).unwrap() {
        order.push(task.task_id);
        c.complete_task(&a, "ok").unwrap();
    }
    assert_eq!(order, vec![urgent, n1, n2, low]);
}

#[test]
fn test_specialist_gets_matching_work_only() {
    let (c, _) = create_test_coordinator();
    let writer = c.register_agent("writer", ["writing"]);
    let coder = c.register_agent("coder", ["coding", "testing"]);

    c.create_task(NewTask::new("tests", "").requires(["coding", "testing"]));
    c.create_task(NewTask::new("docs", "").requires(["writing"]));

    assert_eq!(c.get_next_task(&writer).unwrap().unwrap().title, "docs");
    assert_eq!(c.get_next_task(&coder).unwrap().unwrap().title, "tests");
}

// ============================================================================
// Concurrency tests
// ============================================================================

#[test]
fn test_concurrent_pulls_assign_each_task_once() {
    let (c, _) = create_test_coordinator();
    let task_count = 50;
    for i in 0..task_count {
        c.create_task(NewTask::new(format!("t{}", i), ""));
    }
    let agents: Vec<String> = (0..8)
        .map(|i| c.register_agent(&format!("worker-{}", i), Vec::<String>::new()))
        .collect();

    let handles: Vec<_> = agents
        .into_iter()
        .map(|agent_id| {
            let c = c.clone();
            std::thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(task) = c.get_next_task(&agent_id).unwrap() {
                    got.push(task.task_id);
                    c.complete_task(&agent_id, "ok").unwrap();
                }
                got
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for task_id in handle.join().unwrap() {
            assert!(seen.insert(task_id), "task assigned twice");
        }
    }
    assert_eq!(seen.len(), task_count);
    assert_eq!(c.task_board().tasks_summary.completed, task_count);
}

// ============================================================================
// Liveness tests
// ============================================================================

#[test]
fn test_stale_agent_task_moves_to_another_agent() {
    let (c, clock) = create_test_coordinator();
    let a = c.register_agent("A", ["coding"]);
    let t = c.create_task(NewTask::new("T", "").requires(["coding"]));
    assert!(c.get_next_task(&a).unwrap().is_some());

    clock.advance(Duration::from_secs(60));
    let b = c.register_agent("B", ["coding"]);
    clock.advance(Duration::from_secs(31));

    // Lazy sweep on the next pull
    let task = c.get_next_task(&b).unwrap().expect("requeued task");
    assert_eq!(task.task_id, t);

    let agent_a = c.get_agent(&a).unwrap();
    assert_eq!(agent_a.status, AgentStatus::Offline);
    assert!(agent_a.current_task.is_none());
    assert!(matches!(
        c.complete_task(&a, "late"),
        Err(HiveError::NoActiveTask(_))
    ));
}

#[test]
fn test_heartbeats_keep_agent_alive() {
    let (c, clock) = create_test_coordinator();
    let a = c.register_agent("A", Vec::<String>::new());
    let t = c.create_task(NewTask::new("T", ""));
    c.get_next_task(&a).unwrap();

    for _ in 0..10 {
        clock.advance(Duration::from_secs(60));
        c.heartbeat(&a).unwrap();
    }
    assert!(c.sweep_stale_agents().is_empty());
    assert_eq!(c.get_task(&t).unwrap().state, TaskState::Assigned);
    assert_eq!(c.complete_task(&a, "done").unwrap(), t);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper_requeues() {
    let clock = Arc::new(ManualClock::new(0));
    let liveness = LivenessConfig {
        staleness_secs: 30,
        sweep_interval_secs: 5,
    };
    let c = Arc::new(Coordinator::with_clock(liveness, clock.clone()));
    c.spawn_liveness_sweeper();

    let a = c.register_agent("A", Vec::<String>::new());
    let t = c.create_task(NewTask::new("T", ""));
    c.get_next_task(&a).unwrap();

    clock.advance(Duration::from_secs(31));
    tokio::time::sleep(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    // The background task already did the work
    assert!(c.sweep_stale_agents().is_empty());
    let board = c.task_board();
    assert_eq!(board.tasks_summary.pending, 1);
    assert_eq!(board.pending_queue, vec![t]);
    c.close();
}

// ============================================================================
// Tool policy tests
// ============================================================================

#[tokio::test]
async fn test_local_only_tool_forbidden_remotely_allowed_locally() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("README.md"), "# hive").unwrap();

    let mut config = CoordinatorConfig::default();
    config.workspace.allowed_base_dirs = vec![dir.path().to_path_buf()];
    config.workspace.default_working_dir = dir.path().to_path_buf();

    let (c, _) = create_test_coordinator();
    let router = ToolRouter::new(c, &config);
    let args = json!({ "path": "README.md" });

    let err = router
        .invoke_tool("read_file", args.clone(), &ConnectionContext::remote())
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::Forbidden { .. }));
    assert_eq!(err.code(), "FORBIDDEN");

    let out = router
        .invoke_tool("read_file", args, &ConnectionContext::local())
        .await
        .unwrap();
    assert_eq!(out["content"], "# hive");
}

#[test]
fn test_remote_listing_hides_local_tools() {
    let (c, _) = create_test_coordinator();
    let router = ToolRouter::new(c, &CoordinatorConfig::default());
    let listing = router.list_tools(&ConnectionContext::remote());

    let names: HashSet<_> = listing.tools.iter().map(|t| t.name.as_str()).collect();
    for tool in ["register_agent", "create_task", "get_next_task", "complete_task", "heartbeat", "get_task_board"] {
        assert!(names.contains(tool), "{} missing", tool);
    }
    for tool in ["read_file", "write_file", "vscode_create_file", "run_in_terminal"] {
        assert!(!names.contains(tool), "{} leaked", tool);
    }
    assert_eq!(listing.meta.filter_stats.filtered_out, 4);
}
