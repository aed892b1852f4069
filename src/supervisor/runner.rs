//! The supervisor: plans an objective into a subtask graph and walks it.
//!
//! `plan` decomposes via the injected planner and computes the execution
//! order; `execute` dispatches ready subtasks to handlers and checkpoints
//! after every transition; `resume` picks an interrupted run up from its
//! latest checkpoint. A handler failure is recorded as data and blocks only
//! the failed subtask's dependents — it never aborts the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointManager;
use crate::dag::{GraphBuilder, execution_order};
use crate::errors::PlanningError;
use crate::planner::Planner;
use crate::subtask::{Plan, Subtask, Task};
use crate::supervisor::handler::{HandlerContext, HandlerRegistry, SubtaskHandler};
use crate::supervisor::state::RunState;

/// Configuration for the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Upper bound on dispatched subtasks per run, guarding against
    /// misbehaving handlers. Reaching it ends the run in whatever partial
    /// state exists; it is not itself a failure.
    pub max_iterations: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { max_iterations: 50 }
    }
}

impl SupervisorConfig {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }
}

/// Events emitted during run execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    RunStarted {
        run_id: String,
        subtask_count: usize,
    },
    SubtaskStarted {
        subtask_id: String,
        subtask_type: String,
        handler: String,
    },
    SubtaskCompleted {
        subtask_id: String,
    },
    SubtaskFailed {
        subtask_id: String,
        error: String,
    },
    SubtasksBlocked {
        subtask_ids: Vec<String>,
    },
    RunFinished {
        run_id: String,
        completed: usize,
        failed: usize,
    },
}

/// Plans, executes, and resumes research runs.
pub struct Supervisor {
    planner: Arc<dyn Planner>,
    registry: HandlerRegistry,
    checkpoints: CheckpointManager,
    config: SupervisorConfig,
    event_tx: Option<mpsc::Sender<SupervisorEvent>>,
}

impl Supervisor {
    pub fn new(planner: Arc<dyn Planner>, checkpoints: CheckpointManager) -> Self {
        Self {
            planner,
            registry: HandlerRegistry::new(),
            checkpoints,
            config: SupervisorConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SupervisorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Register a handler for a subtask type tag. The last registration per
    /// tag wins.
    pub fn register_handler(&mut self, subtask_type: &str, handler: Arc<dyn SubtaskHandler>) {
        self.registry.register(subtask_type, handler);
    }

    /// Replace the fallback used for subtask types nobody registered.
    pub fn set_fallback_handler(&mut self, handler: Arc<dyn SubtaskHandler>) {
        self.registry.set_fallback(handler);
    }

    /// Decompose a task into an executable plan.
    ///
    /// Fails — returning no partial plan — if the planner errors, produces
    /// nothing, or decomposes into a cyclic dependency graph.
    pub async fn plan(&self, task: &Task) -> Result<Plan, PlanningError> {
        let response = self
            .planner
            .decompose(&task.objective)
            .await
            .map_err(PlanningError::Planner)?;

        if response.subtasks.is_empty() {
            return Err(PlanningError::EmptyPlan {
                objective: task.objective.clone(),
            });
        }

        // Assign ids first so index-based dependencies can be rewritten.
        let mut subtasks: Vec<Subtask> = response
            .subtasks
            .iter()
            .map(|spec| Subtask::new(&task.id, &spec.subtask_type, &spec.objective, spec.priority))
            .collect();
        let ids: Vec<String> = subtasks.iter().map(|s| s.id.clone()).collect();

        for (i, spec) in response.subtasks.iter().enumerate() {
            let mut deps = Vec::with_capacity(spec.depends_on.len());
            for &dep in &spec.depends_on {
                if dep >= ids.len() {
                    return Err(PlanningError::DependencyIndexOutOfRange {
                        subtask: subtasks[i].id.clone(),
                        index: dep,
                        len: ids.len(),
                    });
                }
                deps.push(ids[dep].clone());
            }
            subtasks[i].depends_on = deps;
        }

        let graph = GraphBuilder::new(subtasks.clone()).build()?;
        let order = execution_order(&graph)?;

        info!(
            task_id = %task.id,
            subtasks = subtasks.len(),
            "planned objective"
        );
        Ok(Plan::new(&task.id, &task.objective, subtasks, order))
    }

    /// Execute a task, planning first if no plan is supplied.
    pub async fn execute(&self, task: &Task, plan: Option<Plan>) -> Result<RunState> {
        let plan = match plan {
            Some(plan) => plan,
            None => self.plan(task).await.context("Planning failed")?,
        };
        let mut state = RunState::new(task, plan, self.config.max_iterations);
        state.context = task.metadata.clone();

        info!(run_id = %state.id, subtasks = state.plan.subtasks.len(), "run started");
        self.emit(SupervisorEvent::RunStarted {
            run_id: state.id.clone(),
            subtask_count: state.plan.subtasks.len(),
        })
        .await;

        self.run_loop(&mut state, None).await;
        Ok(state)
    }

    /// Resume an interrupted run from its latest checkpoint.
    ///
    /// `Ok(None)` when the run has no checkpoints.
    pub async fn resume(&self, run_id: &str) -> Result<Option<RunState>> {
        let Some(mut state) = self
            .checkpoints
            .restore_state::<RunState>(run_id)
            .await
            .context("Failed to restore run state")?
        else {
            return Ok(None);
        };

        // A subtask caught mid-dispatch by the crash is re-dispatched.
        state.reset_in_progress();

        // Chain new checkpoints onto the one we resumed from.
        let parent = self
            .checkpoints
            .list_history(run_id)
            .await
            .context("Failed to read checkpoint history")?
            .first()
            .map(|meta| meta.id.clone());

        info!(run_id, remaining = state.remaining(), "resuming run");
        self.run_loop(&mut state, parent).await;
        Ok(Some(state))
    }

    /// Walk the execution order until nothing is runnable or the iteration
    /// cap is hit. Never returns an error: handler failures are data, and
    /// checkpoint write failures only stall durability, not execution.
    async fn run_loop(&self, state: &mut RunState, mut parent_checkpoint: Option<String>) {
        while state.iteration < state.max_iterations {
            let Some(subtask_id) = state.next_runnable() else {
                debug!(run_id = %state.id, "no runnable subtask remains");
                break;
            };
            state.iteration += 1;
            state.current_subtask = Some(subtask_id.clone());

            // Clone out what dispatch needs; the handler must not see (or
            // hold up) mid-mutation state.
            let mut subtask = state
                .plan
                .get_subtask(&subtask_id)
                .cloned()
                .expect("runnable subtask exists in plan");
            let handler = self.registry.resolve(&subtask.subtask_type);
            subtask.mark_started(handler.name());
            if let Some(live) = state.plan.get_subtask_mut(&subtask_id) {
                *live = subtask.clone();
            }

            debug!(
                run_id = %state.id,
                subtask_id = %subtask_id,
                subtask_type = %subtask.subtask_type,
                handler = handler.name(),
                iteration = state.iteration,
                "dispatching subtask"
            );
            self.emit(SupervisorEvent::SubtaskStarted {
                subtask_id: subtask_id.clone(),
                subtask_type: subtask.subtask_type.clone(),
                handler: handler.name().to_string(),
            })
            .await;

            let context = HandlerContext {
                objective: state.objective.clone(),
                context: state.context.clone(),
                completed_results: state.completed_results(),
            };

            match handler.handle(&subtask, &context).await {
                Ok(result) => {
                    state.record_completed(&subtask_id, result);
                    self.emit(SupervisorEvent::SubtaskCompleted {
                        subtask_id: subtask_id.clone(),
                    })
                    .await;
                }
                Err(err) => {
                    warn!(run_id = %state.id, subtask_id = %subtask_id, error = %err, "subtask failed");
                    let blocked = state.record_failed(&subtask_id, &err.to_string());
                    self.emit(SupervisorEvent::SubtaskFailed {
                        subtask_id: subtask_id.clone(),
                        error: err.to_string(),
                    })
                    .await;
                    if !blocked.is_empty() {
                        self.emit(SupervisorEvent::SubtasksBlocked {
                            subtask_ids: blocked,
                        })
                        .await;
                    }
                }
            }
            state.current_subtask = None;

            // Fail open on checkpoint errors: in-memory state stays valid,
            // the durability point just does not advance.
            match self
                .checkpoints
                .save_state(
                    &state.id,
                    state,
                    &format!("subtask_{}", subtask_id),
                    parent_checkpoint.clone(),
                    None,
                )
                .await
            {
                Ok(checkpoint) => parent_checkpoint = Some(checkpoint.id),
                Err(err) => {
                    warn!(run_id = %state.id, error = %err, "checkpoint write failed; continuing");
                }
            }
        }

        info!(
            run_id = %state.id,
            completed = state.completed_subtasks.len(),
            failed = state.failed_subtasks.len(),
            iterations = state.iteration,
            "run finished"
        );
        self.emit(SupervisorEvent::RunFinished {
            run_id: state.id.clone(),
            completed: state.completed_subtasks.len(),
            failed: state.failed_subtasks.len(),
        })
        .await;
    }

    async fn emit(&self, event: SupervisorEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}
