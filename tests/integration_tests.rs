//! Integration tests for delver
//!
//! These tests verify that planning, execution, checkpointing, and resume
//! work together correctly against both store backends.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;

use delver::checkpoint::{CheckpointManager, MemoryStore, SqliteStore};
use delver::errors::HandlerError;
use delver::planner::{PlanResponse, StaticPlanner, SubtaskSpec};
use delver::subtask::{SubtaskStatus, Task};
use delver::supervisor::state::RunState;
use delver::supervisor::{
    HandlerContext, Supervisor, SupervisorConfig, SupervisorEvent, SubtaskHandler,
};
use delver::Subtask;

/// Handler that succeeds and counts its invocations.
struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SubtaskHandler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    async fn handle(
        &self,
        subtask: &Subtask,
        _context: &HandlerContext,
    ) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "objective": subtask.objective }))
    }
}

/// Handler that fails on subtasks whose objective contains a marker string.
struct SelectiveFailHandler {
    fail_on: String,
}

#[async_trait]
impl SubtaskHandler for SelectiveFailHandler {
    fn name(&self) -> &str {
        "selective_fail"
    }

    async fn handle(
        &self,
        subtask: &Subtask,
        context: &HandlerContext,
    ) -> Result<Value, HandlerError> {
        if subtask.objective.contains(&self.fail_on) {
            return Err(HandlerError::new("simulated upstream failure"));
        }
        Ok(json!({ "inputs": context.completed_results.len() }))
    }
}

/// A two-branch plan: a and b are roots, c depends on a, d depends on b,
/// e fuses c and d.
fn two_branch_response() -> PlanResponse {
    PlanResponse {
        reasoning: "two independent branches joined by a fusion step".to_string(),
        subtasks: vec![
            SubtaskSpec::new("search branch a", "search", 5),
            SubtaskSpec::new("search branch b", "search", 5),
            SubtaskSpec::new("analyze branch a", "analysis", 5).with_depends_on(vec![0]),
            SubtaskSpec::new("analyze branch b", "analysis", 5).with_depends_on(vec![1]),
            SubtaskSpec::new("fuse findings", "fusion", 5).with_depends_on(vec![2, 3]),
        ],
    }
}

fn memory_manager() -> CheckpointManager {
    CheckpointManager::new(Arc::new(MemoryStore::new()))
}

// =============================================================================
// Planning
// =============================================================================

mod planning {
    use super::*;

    #[tokio::test]
    async fn test_plan_orders_dependencies_before_dependents() {
        let supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            memory_manager(),
        );
        let task = Task::new("run-plan", "survey the field");

        let plan = supervisor.plan(&task).await.unwrap();
        assert_eq!(plan.subtasks.len(), 5);
        assert_eq!(plan.execution_order.len(), 5);

        let position = |id: &str| {
            plan.execution_order
                .iter()
                .position(|x| x == id)
                .unwrap()
        };
        for subtask in &plan.subtasks {
            for dep in &subtask.depends_on {
                assert!(
                    position(dep) < position(&subtask.id),
                    "dependency must come before dependent in execution order"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_plan_rejects_out_of_range_dependency_index() {
        let response = PlanResponse {
            reasoning: String::new(),
            subtasks: vec![SubtaskSpec::new("only step", "search", 5).with_depends_on(vec![3])],
        };
        let supervisor = Supervisor::new(Arc::new(StaticPlanner::new(response)), memory_manager());
        let task = Task::new("run-bad-dep", "objective");

        let err = supervisor.plan(&task).await.unwrap_err();
        assert!(err.to_string().contains("depends on index 3"), "{err}");
    }

    #[tokio::test]
    async fn test_plan_rejects_cyclic_dependencies() {
        let response = PlanResponse {
            reasoning: String::new(),
            subtasks: vec![
                SubtaskSpec::new("a", "search", 5).with_depends_on(vec![1]),
                SubtaskSpec::new("b", "search", 5).with_depends_on(vec![0]),
            ],
        };
        let supervisor = Supervisor::new(Arc::new(StaticPlanner::new(response)), memory_manager());
        let task = Task::new("run-cycle", "objective");

        assert!(supervisor.plan(&task).await.is_err());
    }

    #[tokio::test]
    async fn test_higher_priority_runs_first_among_ready() {
        let response = PlanResponse {
            reasoning: String::new(),
            subtasks: vec![
                SubtaskSpec::new("low priority", "search", 2),
                SubtaskSpec::new("high priority", "search", 9),
            ],
        };
        let supervisor = Supervisor::new(Arc::new(StaticPlanner::new(response)), memory_manager());
        let task = Task::new("run-priority", "objective");

        let plan = supervisor.plan(&task).await.unwrap();
        let first = plan.get_subtask(&plan.execution_order[0]).unwrap();
        assert_eq!(first.objective, "high priority");
    }
}

// =============================================================================
// Execution
// =============================================================================

mod execution {
    use super::*;

    #[tokio::test]
    async fn test_execute_completes_all_subtasks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            memory_manager(),
        );
        supervisor.register_handler(
            "search",
            Arc::new(CountingHandler {
                calls: calls.clone(),
            }),
        );
        supervisor.register_handler(
            "analysis",
            Arc::new(CountingHandler {
                calls: calls.clone(),
            }),
        );
        supervisor.register_handler(
            "fusion",
            Arc::new(CountingHandler {
                calls: calls.clone(),
            }),
        );

        let task = Task::new("run-complete", "survey the field");
        let state = supervisor.execute(&task, None).await.unwrap();

        assert_eq!(state.completed_subtasks.len(), 5);
        assert!(state.failed_subtasks.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(state
            .plan
            .subtasks
            .iter()
            .all(|s| s.status == SubtaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_unregistered_type_falls_back_to_generic() {
        let response = PlanResponse {
            reasoning: String::new(),
            subtasks: vec![SubtaskSpec::new("step with unknown type", "exotic", 5)],
        };
        let supervisor = Supervisor::new(Arc::new(StaticPlanner::new(response)), memory_manager());
        let task = Task::new("run-fallback", "objective");

        let state = supervisor.execute(&task, None).await.unwrap();
        assert_eq!(state.completed_subtasks.len(), 1);
        let subtask = &state.plan.subtasks[0];
        assert_eq!(subtask.handler.as_deref(), Some("generic"));
    }

    #[tokio::test]
    async fn test_replaced_fallback_handles_unknown_types() {
        let response = PlanResponse {
            reasoning: String::new(),
            subtasks: vec![SubtaskSpec::new("step with unknown type", "exotic", 5)],
        };
        let mut supervisor =
            Supervisor::new(Arc::new(StaticPlanner::new(response)), memory_manager());
        let calls = Arc::new(AtomicUsize::new(0));
        supervisor.set_fallback_handler(Arc::new(CountingHandler {
            calls: calls.clone(),
        }));

        let task = Task::new("run-custom-fallback", "objective");
        let state = supervisor.execute(&task, None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.plan.subtasks[0].handler.as_deref(), Some("counting"));
    }

    #[tokio::test]
    async fn test_failure_blocks_dependents_but_not_siblings() {
        let mut supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            memory_manager(),
        );
        // Branch b's root fails; branch a must still complete.
        supervisor.register_handler(
            "search",
            Arc::new(SelectiveFailHandler {
                fail_on: "branch b".to_string(),
            }),
        );
        supervisor.register_handler(
            "analysis",
            Arc::new(SelectiveFailHandler {
                fail_on: "nothing".to_string(),
            }),
        );

        let task = Task::new("run-blocked", "survey the field");
        let state = supervisor.execute(&task, None).await.unwrap();

        let by_objective = |needle: &str| {
            state
                .plan
                .subtasks
                .iter()
                .find(|s| s.objective.contains(needle))
                .unwrap()
        };
        assert_eq!(by_objective("search branch a").status, SubtaskStatus::Completed);
        assert_eq!(by_objective("analyze branch a").status, SubtaskStatus::Completed);
        assert_eq!(by_objective("search branch b").status, SubtaskStatus::Failed);
        // Downstream of the failure: blocked, never dispatched.
        assert_eq!(by_objective("analyze branch b").status, SubtaskStatus::Blocked);
        assert_eq!(by_objective("fuse findings").status, SubtaskStatus::Blocked);
        assert!(by_objective("fuse findings").handler.is_none());
    }

    #[tokio::test]
    async fn test_failed_root_with_high_priority_sibling() {
        // A (p5) feeds B (p8); C (p9) is independent. A fails.
        let response = PlanResponse {
            reasoning: String::new(),
            subtasks: vec![
                SubtaskSpec::new("gather for poisoned branch", "search", 5),
                SubtaskSpec::new("analyze poisoned branch", "analysis", 8).with_depends_on(vec![0]),
                SubtaskSpec::new("independent survey", "search", 9),
            ],
        };
        let mut supervisor =
            Supervisor::new(Arc::new(StaticPlanner::new(response)), memory_manager());
        supervisor.register_handler(
            "search",
            Arc::new(SelectiveFailHandler {
                fail_on: "poisoned".to_string(),
            }),
        );

        let task = Task::new("run-priority-fail", "objective");
        let state = supervisor.execute(&task, None).await.unwrap();

        let by_objective = |needle: &str| {
            state
                .plan
                .subtasks
                .iter()
                .find(|s| s.objective.contains(needle))
                .unwrap()
        };
        let a = by_objective("gather");
        let b = by_objective("analyze");
        let c = by_objective("independent");

        assert_eq!(state.failed_subtasks, vec![a.id.clone()]);
        assert_eq!(state.completed_subtasks, vec![c.id.clone()]);
        assert_eq!(b.status, SubtaskStatus::Blocked);
        assert!(b.handler.is_none(), "blocked subtask never dispatched");
        // Priority put the independent subtask ahead of the doomed branch.
        assert_eq!(state.plan.execution_order[0], c.id);
    }

    #[tokio::test]
    async fn test_completed_results_flow_to_downstream_handlers() {
        struct AssertInputsHandler;

        #[async_trait]
        impl SubtaskHandler for AssertInputsHandler {
            fn name(&self) -> &str {
                "assert_inputs"
            }

            async fn handle(
                &self,
                subtask: &Subtask,
                context: &HandlerContext,
            ) -> Result<Value, HandlerError> {
                // Every declared dependency's result must be visible.
                for dep in &subtask.depends_on {
                    if !context.completed_results.contains_key(dep) {
                        return Err(HandlerError::new("missing dependency result"));
                    }
                }
                Ok(json!({ "seen": context.completed_results.len() }))
            }
        }

        let mut supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            memory_manager(),
        );
        for tag in ["search", "analysis", "fusion"] {
            supervisor.register_handler(tag, Arc::new(AssertInputsHandler));
        }

        let task = Task::new("run-results", "survey the field");
        let state = supervisor.execute(&task, None).await.unwrap();
        assert_eq!(state.completed_subtasks.len(), 5);

        let fusion = state
            .plan
            .subtasks
            .iter()
            .find(|s| s.subtask_type == "fusion")
            .unwrap();
        // The fusion step saw all four upstream results.
        assert_eq!(fusion.result.as_ref().unwrap()["seen"], json!(4));
    }

    #[tokio::test]
    async fn test_iteration_cap_stops_the_run() {
        let supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            memory_manager(),
        )
        .with_config(SupervisorConfig::default().with_max_iterations(2));

        let task = Task::new("run-capped", "survey the field");
        let state = supervisor.execute(&task, None).await.unwrap();

        assert_eq!(state.iteration, 2);
        assert_eq!(state.completed_subtasks.len(), 2);
        assert_eq!(state.remaining(), 3);
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            memory_manager(),
        )
        .with_event_channel(tx);

        let task = Task::new("run-events", "survey the field");
        supervisor.execute(&task, None).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(SupervisorEvent::RunStarted { .. })));
        assert!(matches!(events.last(), Some(SupervisorEvent::RunFinished { .. })));
        let started = events
            .iter()
            .filter(|e| matches!(e, SupervisorEvent::SubtaskStarted { .. }))
            .count();
        let completed = events
            .iter()
            .filter(|e| matches!(e, SupervisorEvent::SubtaskCompleted { .. }))
            .count();
        assert_eq!(started, 5);
        assert_eq!(completed, 5);
    }
}

// =============================================================================
// Checkpointing and resume
// =============================================================================

mod resume {
    use super::*;
    use anyhow::{Result, anyhow, bail};
    use delver::checkpoint::{Checkpoint, CheckpointMeta, CheckpointStore, RollbackOutcome};

    /// Store whose writes always fail, as if the disk were gone.
    struct BrokenStore;

    #[async_trait]
    impl CheckpointStore for BrokenStore {
        async fn save(&self, _checkpoint: Checkpoint) -> Result<()> {
            bail!("disk full")
        }

        async fn load_latest(&self, _run_id: &str) -> Result<Option<Checkpoint>> {
            Ok(None)
        }

        async fn load(&self, _checkpoint_id: &str) -> Result<Option<Checkpoint>> {
            Ok(None)
        }

        async fn list(&self, _run_id: &str) -> Result<Vec<CheckpointMeta>> {
            Ok(Vec::new())
        }

        async fn delete_after(&self, _run_id: &str, _checkpoint_id: &str) -> Result<RollbackOutcome> {
            Err(anyhow!("disk full"))
        }

        async fn delete_run(&self, _run_id: &str) -> Result<usize> {
            Err(anyhow!("disk full"))
        }
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_does_not_halt_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            CheckpointManager::new(Arc::new(BrokenStore)),
        );
        for tag in ["search", "analysis", "fusion"] {
            supervisor.register_handler(
                tag,
                Arc::new(CountingHandler {
                    calls: calls.clone(),
                }),
            );
        }

        // Every checkpoint write fails; the in-memory run must be unaffected.
        let task = Task::new("run-no-disk", "survey the field");
        let state = supervisor.execute(&task, None).await.unwrap();

        assert_eq!(state.completed_subtasks.len(), 5);
        assert!(state.failed_subtasks.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(state
            .plan
            .subtasks
            .iter()
            .all(|s| s.status == SubtaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_execute_checkpoints_every_transition() {
        let manager = memory_manager();
        let supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            manager.clone(),
        );

        let task = Task::new("run-history", "survey the field");
        supervisor.execute(&task, None).await.unwrap();

        let history = manager.list_history("run-history").await.unwrap();
        assert_eq!(history.len(), 5);
        // Newest first, chained to its predecessor.
        assert!(history[0].step_label.starts_with("subtask_"));
        assert_eq!(history[0].parent_id.as_deref(), Some(history[1].id.as_str()));
        assert!(history[4].parent_id.is_none());
    }

    #[tokio::test]
    async fn test_resume_runs_only_the_remaining_subtasks() {
        let manager = memory_manager();
        let planner = Arc::new(StaticPlanner::new(two_branch_response()));
        let supervisor = Supervisor::new(planner.clone(), manager.clone());

        // Build the run by hand up to the point of interruption: three of
        // five subtasks completed, then the process dies.
        let task = Task::new("run-resume", "survey the field");
        let plan = supervisor.plan(&task).await.unwrap();
        let mut state = RunState::new(&task, plan, 50);
        let first_three: Vec<String> = state.plan.execution_order[..3].to_vec();
        for (i, id) in first_three.iter().enumerate() {
            state.iteration += 1;
            state.record_completed(id, json!({ "step": i }));
        }
        manager
            .save_state("run-resume", &state, "subtask_interrupted", None, None)
            .await
            .unwrap();

        // A fresh supervisor over the same store picks the run back up.
        let calls = Arc::new(AtomicUsize::new(0));
        let mut resumed_supervisor = Supervisor::new(planner, manager.clone());
        for tag in ["search", "analysis", "fusion"] {
            resumed_supervisor.register_handler(
                tag,
                Arc::new(CountingHandler {
                    calls: calls.clone(),
                }),
            );
        }
        let resumed = resumed_supervisor
            .resume("run-resume")
            .await
            .unwrap()
            .expect("checkpoint exists");

        // Only the two unfinished subtasks were dispatched.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resumed.completed_subtasks.len(), 5);
        let rerun: HashSet<&String> = resumed.completed_subtasks[3..].iter().collect();
        for id in &first_three {
            assert!(!rerun.contains(id), "completed work must not rerun");
        }
    }

    #[tokio::test]
    async fn test_resume_redispatches_in_progress_subtask() {
        let manager = memory_manager();
        let planner = Arc::new(StaticPlanner::new(two_branch_response()));
        let supervisor = Supervisor::new(planner.clone(), manager.clone());

        let task = Task::new("run-midflight", "survey the field");
        let plan = supervisor.plan(&task).await.unwrap();
        let mut state = RunState::new(&task, plan, 50);
        // Crash mid-dispatch: the first subtask is in_progress, nothing done.
        let first = state.plan.execution_order[0].clone();
        state.plan.get_subtask_mut(&first).unwrap().mark_started("counting");
        state.current_subtask = Some(first.clone());
        manager
            .save_state("run-midflight", &state, "subtask_interrupted", None, None)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut resumed_supervisor = Supervisor::new(planner, manager);
        for tag in ["search", "analysis", "fusion"] {
            resumed_supervisor.register_handler(
                tag,
                Arc::new(CountingHandler {
                    calls: calls.clone(),
                }),
            );
        }
        let resumed = resumed_supervisor
            .resume("run-midflight")
            .await
            .unwrap()
            .expect("checkpoint exists");

        // The interrupted subtask was re-dispatched along with the rest.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(resumed.completed_subtasks.len(), 5);
        assert!(resumed.current_subtask.is_none());
    }

    #[tokio::test]
    async fn test_resume_unknown_run_returns_none() {
        let supervisor = Supervisor::new(
            Arc::new(StaticPlanner::single_step()),
            memory_manager(),
        );
        assert!(supervisor.resume("never-ran").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_truncates_history_and_returns_state() {
        let manager = memory_manager();
        let supervisor = Supervisor::new(
            Arc::new(StaticPlanner::new(two_branch_response())),
            manager.clone(),
        );

        let task = Task::new("run-rollback", "survey the field");
        supervisor.execute(&task, None).await.unwrap();

        let history = manager.list_history("run-rollback").await.unwrap();
        assert_eq!(history.len(), 5);
        // Roll back to the second checkpoint (index 3 counting from newest).
        let target = history[3].id.clone();

        let state: RunState = manager.rollback_to("run-rollback", &target).await.unwrap();
        assert_eq!(state.completed_subtasks.len(), 2);

        let truncated = manager.list_history("run-rollback").await.unwrap();
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].id, target);
    }
}

// =============================================================================
// Depth control inside handlers
// =============================================================================

mod depth_in_handlers {
    use super::*;
    use delver::depth::{DepthConfig, DepthController, TokenBudget};

    /// Handler that runs an iterative search loop governed by a depth
    /// controller, charging a fixed token cost per iteration.
    struct IterativeHandler {
        budget: TokenBudget,
        cost_per_iteration: u64,
    }

    #[async_trait]
    impl SubtaskHandler for IterativeHandler {
        fn name(&self) -> &str {
            "iterative"
        }

        async fn handle(
            &self,
            _subtask: &Subtask,
            _context: &HandlerContext,
        ) -> Result<Value, HandlerError> {
            let controller =
                DepthController::new(DepthConfig::default(), Arc::new(self.budget.clone()));
            let mut state = controller.initialize_state(0.6, None);

            let mut iterations = 0u32;
            while controller.should_continue(&state) {
                controller.increment_iteration(&mut state);
                iterations += 1;
                self.budget.consume(self.cost_per_iteration);

                // Each pass firms up the evidence a little.
                let signal = 0.15 * f64::from(iterations);
                controller
                    .update_metrics(&mut state, Some(signal), Some(signal), None)
                    .await;
                let adjustment = controller.evaluate_adjustment(&state);
                controller.apply_adjustment(&mut state, &adjustment);
                if !adjustment.proceed {
                    break;
                }
            }

            Ok(json!({
                "iterations": iterations,
                "final_level": state.current_level.as_str(),
                "confidence": state.confidence,
            }))
        }
    }

    #[tokio::test]
    async fn test_handler_loop_stops_on_evidence() {
        let mut supervisor = Supervisor::new(
            Arc::new(StaticPlanner::single_step()),
            memory_manager(),
        );
        supervisor.register_handler(
            "research",
            Arc::new(IterativeHandler {
                budget: TokenBudget::new(100_000),
                cost_per_iteration: 100,
            }),
        );

        let task = Task::new("run-depth", "deep dive the topic");
        let state = supervisor.execute(&task, None).await.unwrap();
        assert_eq!(state.completed_subtasks.len(), 1);

        let result = state.plan.subtasks[0].result.as_ref().unwrap();
        // Ample budget: the loop runs until the evidence clears the early
        // success bar, never the budget floor.
        let iterations = result["iterations"].as_u64().unwrap();
        assert!(iterations >= 6, "signal reaches 0.9 on the sixth pass");
        assert!(result["confidence"].as_f64().unwrap() >= 0.8);
    }

    #[tokio::test]
    async fn test_handler_loop_stops_on_budget() {
        let mut supervisor = Supervisor::new(
            Arc::new(StaticPlanner::single_step()),
            memory_manager(),
        );
        // Budget gone after the second pass.
        supervisor.register_handler(
            "research",
            Arc::new(IterativeHandler {
                budget: TokenBudget::new(1000),
                cost_per_iteration: 500,
            }),
        );

        let task = Task::new("run-depth-budget", "deep dive the topic");
        let state = supervisor.execute(&task, None).await.unwrap();

        let result = state.plan.subtasks[0].result.as_ref().unwrap();
        let iterations = result["iterations"].as_u64().unwrap();
        assert!(iterations <= 2, "exhausted budget must end the loop");
        // The forced downgrade landed before the loop ended.
        assert_eq!(result["final_level"], json!("shallow"));
    }
}

// =============================================================================
// SQLite durability
// =============================================================================

mod sqlite_durability {
    use super::*;

    #[tokio::test]
    async fn test_state_survives_store_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints.db");

        {
            let manager = CheckpointManager::new(Arc::new(SqliteStore::open(&path).unwrap()));
            let supervisor = Supervisor::new(
                Arc::new(StaticPlanner::new(two_branch_response())),
                manager,
            )
            .with_config(SupervisorConfig::default().with_max_iterations(3));
            let task = Task::new("run-durable", "survey the field");
            let state = supervisor.execute(&task, None).await.unwrap();
            assert_eq!(state.completed_subtasks.len(), 3);
        }

        // Reopen the database as a new process would.
        let manager = CheckpointManager::new(Arc::new(SqliteStore::open(&path).unwrap()));
        let restored: RunState = manager
            .restore_state("run-durable")
            .await
            .unwrap()
            .expect("state persisted across reopen");
        assert_eq!(restored.completed_subtasks.len(), 3);
        assert_eq!(restored.remaining(), 2);

        // And the run finishes against the reopened store.
        let supervisor = Supervisor::new(Arc::new(StaticPlanner::single_step()), manager.clone());
        let finished = supervisor.resume("run-durable").await.unwrap().unwrap();
        assert_eq!(finished.completed_subtasks.len(), 5);

        let history = manager.list_history("run-durable").await.unwrap();
        assert_eq!(history.len(), 5);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_the_given_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints.db");
        let manager = CheckpointManager::new(Arc::new(SqliteStore::open(&path).unwrap()));

        for run in ["run-keep", "run-drop"] {
            let supervisor = Supervisor::new(
                Arc::new(StaticPlanner::single_step()),
                manager.clone(),
            );
            let task = Task::new(run, "objective");
            supervisor.execute(&task, None).await.unwrap();
        }

        let removed = manager.cleanup("run-drop").await.unwrap();
        assert_eq!(removed, 1);
        assert!(manager.list_history("run-drop").await.unwrap().is_empty());
        assert_eq!(manager.list_history("run-keep").await.unwrap().len(), 1);
    }
}
