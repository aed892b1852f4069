//! Checkpoint records and the backend storage contract.
//!
//! Backends persist opaque, immutable checkpoint records per run id with
//! creation-time ordering. Two implementations satisfy the contract: a
//! durable SQLite store and a TTL-expiring in-memory cache. "Latest" ties on
//! `created_at` are broken by insertion order — the later write wins — so
//! concurrent writers to the same run resolve last-write-wins.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single immutable snapshot of run state.
///
/// The `state` field is an opaque serialized envelope; backends never inspect
/// it. Checkpoints are deleted only by rollback or cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub id: String,
    pub run_id: String,
    /// Serialized state envelope.
    pub state: String,
    /// Label for the transition that produced this snapshot
    /// (e.g. "subtask_<id>").
    pub step_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Checkpoint {
    pub fn new(run_id: &str, state: String, step_label: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            state,
            step_label: step_label.to_string(),
            parent_id: None,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The history-listing view of this checkpoint, without the state blob.
    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            id: self.id.clone(),
            run_id: self.run_id.clone(),
            step_label: self.step_label.clone(),
            parent_id: self.parent_id.clone(),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }
}

/// Checkpoint descriptor without the state payload, as returned by history
/// listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMeta {
    pub id: String,
    pub run_id: String,
    pub step_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Outcome of a backend rollback request.
///
/// The distinction between `NotFound` and `WrongRun` lets the manager report
/// an invalid request precisely; in both cases the backend deleted nothing.
#[derive(Debug)]
pub enum RollbackOutcome {
    /// The target checkpoint, with everything created after it deleted.
    RolledBack(Checkpoint),
    NotFound,
    WrongRun { owner: String },
}

/// Backend storage contract shared by the durable and cache stores.
///
/// Errors from these methods are I/O-class failures; "no such record" is
/// expressed in the return type, never as an error. A TTL backend must make
/// "not found due to expiry" indistinguishable from "never written".
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint. Never overwrites an existing record.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// The checkpoint with the greatest creation time for the run.
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Load a checkpoint by id.
    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// All checkpoint metadata for the run, newest first.
    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointMeta>>;

    /// Atomically delete every checkpoint for the run created strictly after
    /// the target, returning the target. Deletes nothing unless the target
    /// exists and belongs to the run.
    async fn delete_after(&self, run_id: &str, checkpoint_id: &str) -> Result<RollbackOutcome>;

    /// Delete all checkpoints for the run, returning how many were removed.
    async fn delete_run(&self, run_id: &str) -> Result<usize>;
}
