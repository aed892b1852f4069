//! Mutable state of one in-flight run.
//!
//! A `RunState` belongs to exactly one execution: it is created at the start
//! of `execute`, mutated on every subtask transition, checkpointed after
//! each, and restored whole by `resume`. Serialization round-trips
//! structurally so restored state is indistinguishable from live state.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::subtask::{Plan, SubtaskStatus, Task};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    /// Run/thread id (= task id).
    pub id: String,
    pub objective: String,
    pub plan: Plan,
    /// Subtask currently being dispatched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_subtask: Option<String>,
    /// Ids of completed subtasks, in completion order.
    pub completed_subtasks: Vec<String>,
    /// Ids of failed subtasks, in failure order.
    pub failed_subtasks: Vec<String>,
    /// Opaque auxiliary context shared with handlers.
    #[serde(default)]
    pub context: serde_json::Map<String, Value>,
    pub iteration: u32,
    pub max_iterations: u32,
}

impl RunState {
    pub fn new(task: &Task, plan: Plan, max_iterations: u32) -> Self {
        Self {
            id: task.id.clone(),
            objective: task.objective.clone(),
            plan,
            current_subtask: None,
            completed_subtasks: Vec::new(),
            failed_subtasks: Vec::new(),
            context: serde_json::Map::new(),
            iteration: 0,
            max_iterations,
        }
    }

    /// The next dispatchable subtask: first in `execution_order` that is
    /// non-terminal with every dependency completed.
    pub fn next_runnable(&self) -> Option<String> {
        let completed: HashSet<&str> =
            self.completed_subtasks.iter().map(String::as_str).collect();
        for id in &self.plan.execution_order {
            let Some(subtask) = self.plan.get_subtask(id) else {
                continue;
            };
            if subtask.is_terminal() || subtask.status == SubtaskStatus::InProgress {
                continue;
            }
            if subtask
                .depends_on
                .iter()
                .all(|dep| completed.contains(dep.as_str()))
            {
                return Some(id.clone());
            }
        }
        None
    }

    /// Record a successful subtask.
    pub fn record_completed(&mut self, id: &str, result: Value) {
        if let Some(subtask) = self.plan.get_subtask_mut(id) {
            subtask.mark_completed(result);
        }
        self.completed_subtasks.push(id.to_string());
    }

    /// Record a failed subtask and block everything downstream of it.
    ///
    /// Returns the ids newly marked blocked. `execution_order` is
    /// topological, so a single pass in that order settles transitive
    /// blocking.
    pub fn record_failed(&mut self, id: &str, error: &str) -> Vec<String> {
        if let Some(subtask) = self.plan.get_subtask_mut(id) {
            subtask.mark_failed(error);
        }
        self.failed_subtasks.push(id.to_string());
        self.propagate_blocked()
    }

    fn propagate_blocked(&mut self) -> Vec<String> {
        let mut dead: HashSet<String> = self
            .plan
            .subtasks
            .iter()
            .filter(|s| matches!(s.status, SubtaskStatus::Failed | SubtaskStatus::Blocked))
            .map(|s| s.id.clone())
            .collect();

        let mut newly_blocked = Vec::new();
        for id in self.plan.execution_order.clone() {
            let Some(subtask) = self.plan.get_subtask_mut(&id) else {
                continue;
            };
            if subtask.is_terminal() {
                continue;
            }
            if subtask.depends_on.iter().any(|dep| dead.contains(dep)) {
                subtask.mark_blocked();
                dead.insert(id.clone());
                newly_blocked.push(id);
            }
        }
        newly_blocked
    }

    /// Reset any interrupted dispatch back to pending (used on resume).
    pub fn reset_in_progress(&mut self) {
        for subtask in &mut self.plan.subtasks {
            if subtask.status == SubtaskStatus::InProgress {
                subtask.status = SubtaskStatus::Pending;
                subtask.started_at = None;
                subtask.handler = None;
            }
        }
        self.current_subtask = None;
    }

    /// Results of completed subtasks, keyed by id.
    pub fn completed_results(&self) -> HashMap<String, Value> {
        self.plan
            .subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .filter_map(|s| s.result.clone().map(|r| (s.id.clone(), r)))
            .collect()
    }

    /// Count of subtasks not yet in a terminal state.
    pub fn remaining(&self) -> usize {
        self.plan
            .subtasks
            .iter()
            .filter(|s| !s.is_terminal())
            .count()
    }
}
