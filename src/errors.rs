//! Typed error hierarchy for the delver runtime.
//!
//! Three top-level types cover the three subsystems:
//! - `PlanningError` — objective decomposition and dependency-graph failures
//! - `HandlerError` — per-subtask handler failures, captured as data
//! - `CheckpointError` — checkpoint manager and store failures

use thiserror::Error;

/// Errors from planning an objective into an executable subtask graph.
///
/// Any of these is fatal to `Supervisor::plan` — no partial plan is ever
/// returned.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Cyclic dependencies among subtasks: {ids:?}")]
    CyclicDependencies { ids: Vec<String> },

    #[error("Subtask '{subtask}' depends on unknown subtask '{dependency}'")]
    UnknownDependency { subtask: String, dependency: String },

    #[error("Subtask '{subtask}' depends on index {index}, but the plan has {len} subtasks")]
    DependencyIndexOutOfRange {
        subtask: String,
        index: usize,
        len: usize,
    },

    #[error("Duplicate subtask id: {id}")]
    DuplicateSubtask { id: String },

    #[error("Planner produced no subtasks for objective: {objective}")]
    EmptyPlan { objective: String },

    #[error("Planner failed: {0}")]
    Planner(#[source] anyhow::Error),
}

/// A handler failed on a single subtask.
///
/// Handler errors are local: they are recorded in the subtask's `error` field
/// and the run's `failed_subtasks` list, and block dependents, but never abort
/// sibling subtasks or the run itself.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    /// Whether the caller could reasonably retry this subtask.
    pub retryable: bool,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

/// Errors from the checkpoint manager and its backends.
///
/// `NotFound` and `WrongRun` are invalid-request failures; `Storage` wraps a
/// backend read/write failure. The two classes are never conflated: a restore
/// of a run with no checkpoints is `Ok(None)`, not an error.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint {checkpoint_id} not found")]
    NotFound { checkpoint_id: String },

    #[error("Checkpoint {checkpoint_id} does not belong to run {run_id}")]
    WrongRun {
        checkpoint_id: String,
        run_id: String,
    },

    #[error("Unsupported state envelope version {found} (expected {expected})")]
    EnvelopeVersion { found: u32, expected: u32 },

    #[error("Failed to serialize run state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to deserialize run state: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("Checkpoint store error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl CheckpointError {
    /// Whether this is an invalid-request failure rather than an I/O failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::WrongRun { .. })
    }
}
