//! Durable, resumable run-state snapshots.
//!
//! The checkpoint manager wraps a `CheckpointStore` backend and persists
//! opaque, schema-versioned snapshots of run state at every transition point.
//! History per run is an append-only log: records are immutable once written
//! and removed only by rollback or cleanup.
//!
//! Backends are interchangeable: `SqliteStore` is the durable store,
//! `MemoryStore` the TTL-expiring cache store. Both order history by creation
//! time with later-insert-wins tie-breaks.

mod envelope;
mod memory;
mod sqlite;
mod store;

pub use envelope::{ENVELOPE_VERSION, StateEnvelope};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{Checkpoint, CheckpointMeta, CheckpointStore, RollbackOutcome};

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::CheckpointError;

/// Saves, restores, and rolls back run-state snapshots through a pluggable
/// store backend.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Persist a new snapshot of `state` for the run.
    ///
    /// Always appends a fresh immutable record — no deduplication, the
    /// history is a full audit trail.
    pub async fn save_state<T: Serialize>(
        &self,
        run_id: &str,
        state: &T,
        step_label: &str,
        parent_checkpoint_id: Option<String>,
        metadata: Option<serde_json::Map<String, Value>>,
    ) -> Result<Checkpoint, CheckpointError> {
        let encoded = StateEnvelope::wrap(state)?.encode()?;
        let checkpoint = Checkpoint::new(run_id, encoded, step_label)
            .with_parent(parent_checkpoint_id)
            .with_metadata(metadata.unwrap_or_default());

        self.store
            .save(checkpoint.clone())
            .await
            .map_err(CheckpointError::Storage)?;
        debug!(run_id, step_label, checkpoint_id = %checkpoint.id, "checkpoint saved");
        Ok(checkpoint)
    }

    /// Restore the most recent state for the run.
    ///
    /// `Ok(None)` means the run has no checkpoints — a fresh start, never an
    /// I/O error.
    pub async fn restore_state<T: DeserializeOwned>(
        &self,
        run_id: &str,
    ) -> Result<Option<T>, CheckpointError> {
        let Some(checkpoint) = self
            .store
            .load_latest(run_id)
            .await
            .map_err(CheckpointError::Storage)?
        else {
            return Ok(None);
        };
        Ok(Some(StateEnvelope::decode(&checkpoint.state)?.into_state()?))
    }

    /// Restore a specific checkpoint's state along with its step label.
    pub async fn restore_from_checkpoint<T: DeserializeOwned>(
        &self,
        checkpoint_id: &str,
    ) -> Result<Option<(T, String)>, CheckpointError> {
        let Some(checkpoint) = self
            .store
            .load(checkpoint_id)
            .await
            .map_err(CheckpointError::Storage)?
        else {
            return Ok(None);
        };
        let state = StateEnvelope::decode(&checkpoint.state)?.into_state()?;
        Ok(Some((state, checkpoint.step_label)))
    }

    /// All checkpoint metadata for the run, newest first.
    pub async fn list_history(&self, run_id: &str) -> Result<Vec<CheckpointMeta>, CheckpointError> {
        self.store
            .list(run_id)
            .await
            .map_err(CheckpointError::Storage)
    }

    /// Roll the run back to a specific checkpoint.
    ///
    /// On success every checkpoint created strictly after the target is
    /// deleted and the target's state is returned. A missing id or an id
    /// belonging to another run fails without deleting anything.
    pub async fn rollback_to<T: DeserializeOwned>(
        &self,
        run_id: &str,
        checkpoint_id: &str,
    ) -> Result<T, CheckpointError> {
        let outcome = self
            .store
            .delete_after(run_id, checkpoint_id)
            .await
            .map_err(CheckpointError::Storage)?;

        match outcome {
            RollbackOutcome::RolledBack(checkpoint) => {
                debug!(run_id, checkpoint_id, "rolled back");
                Ok(StateEnvelope::decode(&checkpoint.state)?.into_state()?)
            }
            RollbackOutcome::NotFound => Err(CheckpointError::NotFound {
                checkpoint_id: checkpoint_id.to_string(),
            }),
            RollbackOutcome::WrongRun { .. } => Err(CheckpointError::WrongRun {
                checkpoint_id: checkpoint_id.to_string(),
                run_id: run_id.to_string(),
            }),
        }
    }

    /// Delete every checkpoint for the run, returning the count removed.
    pub async fn cleanup(&self, run_id: &str) -> Result<usize, CheckpointError> {
        self.store
            .delete_run(run_id)
            .await
            .map_err(CheckpointError::Storage)
    }
}
