//! Durable SQLite checkpoint store.
//!
//! Persistent backend for the `CheckpointStore` contract. Synchronous SQLite
//! I/O runs on tokio's blocking thread pool behind an `Arc<Mutex<_>>` handle,
//! keeping async worker threads free.
//!
//! Tie-break rule: checkpoints are ordered by `(created_at_ns, seq)` where
//! `seq` is the autoincrement row id — the later insert wins ties, making
//! "latest" last-write-wins under concurrent writers.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension, params};

use crate::checkpoint::store::{Checkpoint, CheckpointMeta, CheckpointStore, RollbackOutcome};

/// Async-safe handle to the checkpoint database.
///
/// Wraps `CheckpointDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
struct DbHandle {
    inner: Arc<Mutex<CheckpointDb>>,
}

impl DbHandle {
    fn new(db: CheckpointDb) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut CheckpointDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|e| anyhow!("Checkpoint DB lock poisoned: {}", e))?;
            f(&mut guard)
        })
        .await
        .context("Checkpoint DB task panicked")?
    }
}

struct CheckpointDb {
    conn: Connection,
}

impl CheckpointDb {
    fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open checkpoint database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory checkpoint database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS checkpoints (
                     seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                     id            TEXT NOT NULL UNIQUE,
                     run_id        TEXT NOT NULL,
                     state         TEXT NOT NULL,
                     step_label    TEXT NOT NULL,
                     parent_id     TEXT,
                     created_at_ns INTEGER NOT NULL,
                     metadata      TEXT NOT NULL DEFAULT '{}'
                 );
                 CREATE INDEX IF NOT EXISTS idx_checkpoints_run
                     ON checkpoints (run_id, created_at_ns, seq);",
            )
            .context("Failed to run checkpoint migrations")?;
        Ok(())
    }

    fn insert(&self, checkpoint: &Checkpoint) -> Result<()> {
        let created_at_ns = checkpoint
            .created_at
            .timestamp_nanos_opt()
            .context("Checkpoint timestamp out of range")?;
        let metadata = serde_json::to_string(&checkpoint.metadata)
            .context("Failed to serialize checkpoint metadata")?;
        self.conn
            .execute(
                "INSERT INTO checkpoints (id, run_id, state, step_label, parent_id, created_at_ns, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    checkpoint.id,
                    checkpoint.run_id,
                    checkpoint.state,
                    checkpoint.step_label,
                    checkpoint.parent_id,
                    created_at_ns,
                    metadata,
                ],
            )
            .context("Failed to insert checkpoint")?;
        Ok(())
    }

    fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
        let created_at_ns: i64 = row.get("created_at_ns")?;
        let metadata: String = row.get("metadata")?;
        Ok(Checkpoint {
            id: row.get("id")?,
            run_id: row.get("run_id")?,
            state: row.get("state")?,
            step_label: row.get("step_label")?,
            parent_id: row.get("parent_id")?,
            created_at: DateTime::from_timestamp_nanos(created_at_ns),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }

    fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        self.conn
            .query_row(
                "SELECT id, run_id, state, step_label, parent_id, created_at_ns, metadata
                 FROM checkpoints WHERE run_id = ?1
                 ORDER BY created_at_ns DESC, seq DESC LIMIT 1",
                params![run_id],
                Self::row_to_checkpoint,
            )
            .optional()
            .context("Failed to load latest checkpoint")
    }

    fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        self.conn
            .query_row(
                "SELECT id, run_id, state, step_label, parent_id, created_at_ns, metadata
                 FROM checkpoints WHERE id = ?1",
                params![checkpoint_id],
                Self::row_to_checkpoint,
            )
            .optional()
            .context("Failed to load checkpoint")
    }

    fn list(&self, run_id: &str) -> Result<Vec<CheckpointMeta>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, run_id, state, step_label, parent_id, created_at_ns, metadata
                 FROM checkpoints WHERE run_id = ?1
                 ORDER BY created_at_ns DESC, seq DESC",
            )
            .context("Failed to prepare history query")?;
        let rows = stmt
            .query_map(params![run_id], Self::row_to_checkpoint)
            .context("Failed to list checkpoints")?;
        let mut metas = Vec::new();
        for row in rows {
            metas.push(row.context("Failed to read checkpoint row")?.meta());
        }
        Ok(metas)
    }

    /// Rollback in a single transaction: nothing is deleted unless the target
    /// exists and belongs to the run.
    fn delete_after(&mut self, run_id: &str, checkpoint_id: &str) -> Result<RollbackOutcome> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin rollback transaction")?;

        let target: Option<(i64, Checkpoint)> = tx
            .query_row(
                "SELECT seq, id, run_id, state, step_label, parent_id, created_at_ns, metadata
                 FROM checkpoints WHERE id = ?1",
                params![checkpoint_id],
                |row| {
                    let seq: i64 = row.get("seq")?;
                    Ok((seq, Self::row_to_checkpoint(row)?))
                },
            )
            .optional()
            .context("Failed to look up rollback target")?;

        let Some((target_seq, target)) = target else {
            return Ok(RollbackOutcome::NotFound);
        };
        if target.run_id != run_id {
            return Ok(RollbackOutcome::WrongRun {
                owner: target.run_id,
            });
        }

        let created_at_ns = target
            .created_at
            .timestamp_nanos_opt()
            .context("Checkpoint timestamp out of range")?;
        tx.execute(
            "DELETE FROM checkpoints
             WHERE run_id = ?1
               AND (created_at_ns > ?2 OR (created_at_ns = ?2 AND seq > ?3))",
            params![run_id, created_at_ns, target_seq],
        )
        .context("Failed to delete checkpoints after target")?;

        tx.commit().context("Failed to commit rollback")?;
        Ok(RollbackOutcome::RolledBack(target))
    }

    fn delete_run(&self, run_id: &str) -> Result<usize> {
        let count = self
            .conn
            .execute("DELETE FROM checkpoints WHERE run_id = ?1", params![run_id])
            .context("Failed to delete run checkpoints")?;
        Ok(count)
    }
}

/// Durable `CheckpointStore` backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
}

impl SqliteStore {
    /// Open (or create) a checkpoint database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: DbHandle::new(CheckpointDb::open(path)?),
        })
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: DbHandle::new(CheckpointDb::open_in_memory()?),
        })
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.db.call(move |db| db.insert(&checkpoint)).await
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let run_id = run_id.to_string();
        self.db.call(move |db| db.load_latest(&run_id)).await
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoint_id = checkpoint_id.to_string();
        self.db.call(move |db| db.load(&checkpoint_id)).await
    }

    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointMeta>> {
        let run_id = run_id.to_string();
        self.db.call(move |db| db.list(&run_id)).await
    }

    async fn delete_after(&self, run_id: &str, checkpoint_id: &str) -> Result<RollbackOutcome> {
        let run_id = run_id.to_string();
        let checkpoint_id = checkpoint_id.to_string();
        self.db
            .call(move |db| db.delete_after(&run_id, &checkpoint_id))
            .await
    }

    async fn delete_run(&self, run_id: &str) -> Result<usize> {
        let run_id = run_id.to_string();
        self.db.call(move |db| db.delete_run(&run_id)).await
    }
}
