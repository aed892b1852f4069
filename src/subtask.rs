//! Core domain types for the delver runtime.
//!
//! This module provides:
//! - `Task` — a research objective identified by its run id
//! - `Subtask` — one atomic unit of decomposed work
//! - `SubtaskStatus` — the subtask lifecycle states
//! - `Plan` — an ordered decomposition with a computed execution order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

/// Priority bounds for subtasks. Out-of-range planner output is clamped.
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// A research objective to be decomposed and executed.
///
/// The task id doubles as the run/thread id under which all checkpoints for
/// this execution are recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub objective: String,
    /// Caller-supplied metadata, passed through to handlers untouched.
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Task {
    pub fn new(id: &str, objective: &str) -> Self {
        Self {
            id: id.to_string(),
            objective: objective.to_string(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Lifecycle status of a subtask.
///
/// `Blocked` is terminal: it is assigned only when a dependency has
/// permanently failed. A subtask merely waiting on incomplete dependencies
/// stays `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    /// Check if the subtask is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }
}

impl FromStr for SubtaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid subtask status: {}", s)),
        }
    }
}

/// One atomic unit of decomposed work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    /// Unique subtask id.
    pub id: String,
    /// The task (run) this subtask belongs to.
    pub task_id: String,
    /// Type tag used for handler dispatch (e.g. "search", "fusion").
    pub subtask_type: String,
    /// What this subtask is meant to accomplish.
    pub objective: String,
    /// Priority 1-10; higher runs earlier among ready subtasks.
    pub priority: u8,
    /// Ids of subtasks within the same plan that must complete first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Name of the handler assigned at dispatch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    pub status: SubtaskStatus,
    /// Opaque handler result, present once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Handler error message, present once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Subtask {
    /// Create a new pending subtask with a fresh id.
    pub fn new(task_id: &str, subtask_type: &str, objective: &str, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            subtask_type: subtask_type.to_string(),
            objective: objective.to_string(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            depends_on: Vec::new(),
            handler: None,
            status: SubtaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Add dependency ids to this subtask.
    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to in_progress, stamping the start time.
    pub fn mark_started(&mut self, handler: &str) {
        self.status = SubtaskStatus::InProgress;
        self.handler = Some(handler.to_string());
        self.started_at = Some(Utc::now());
    }

    /// Transition to completed with the handler result.
    pub fn mark_completed(&mut self, result: Value) {
        self.status = SubtaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    /// Transition to failed with the handler error.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = SubtaskStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Transition to blocked because a dependency permanently failed.
    pub fn mark_blocked(&mut self) {
        self.status = SubtaskStatus::Blocked;
        self.completed_at = Some(Utc::now());
    }
}

/// A dependency-ordered decomposition of one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: String,
    pub task_id: String,
    pub objective: String,
    pub subtasks: Vec<Subtask>,
    /// Subtask ids in a dependency-feasible, priority-aware order.
    pub execution_order: Vec<String>,
    pub estimated_steps: usize,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(
        task_id: &str,
        objective: &str,
        subtasks: Vec<Subtask>,
        execution_order: Vec<String>,
    ) -> Self {
        let estimated_steps = subtasks.len();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            objective: objective.to_string(),
            subtasks,
            execution_order,
            estimated_steps,
            created_at: Utc::now(),
        }
    }

    pub fn get_subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn get_subtask_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }
}
