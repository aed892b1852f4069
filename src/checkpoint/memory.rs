//! TTL-expiring in-memory checkpoint store.
//!
//! Cache-class backend for the `CheckpointStore` contract. Entries older than
//! the configured TTL are purged on every access, so an expired checkpoint is
//! indistinguishable from one that was never written. Without a TTL this is a
//! plain in-memory store, useful for tests and ephemeral runs.
//!
//! Tie-break rule: equal `created_at` values resolve by a store-wide
//! monotonic insertion sequence — the later write wins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use crate::checkpoint::store::{Checkpoint, CheckpointMeta, CheckpointStore, RollbackOutcome};

struct StoredCheckpoint {
    checkpoint: Checkpoint,
    seq: u64,
    expires_at: Option<Instant>,
}

impl StoredCheckpoint {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct MemoryInner {
    /// Per-run checkpoint logs, in insertion order.
    runs: HashMap<String, Vec<StoredCheckpoint>>,
    next_seq: u64,
}

impl MemoryInner {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.runs
            .retain(|_, entries| {
                entries.retain(|e| !e.is_expired(now));
                !entries.is_empty()
            });
    }
}

/// In-memory `CheckpointStore` with optional TTL expiry.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    /// Store without expiry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            ttl: None,
        }
    }

    /// Store whose entries expire `ttl` after being written.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            ttl: Some(ttl),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // Lock poisoning only happens if a holder panicked; the data is
        // plain-old-state, so continue with it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut inner = self.lock();
        inner.purge_expired();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        inner
            .runs
            .entry(checkpoint.run_id.clone())
            .or_default()
            .push(StoredCheckpoint {
                checkpoint,
                seq,
                expires_at,
            });
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let mut inner = self.lock();
        inner.purge_expired();
        Ok(inner.runs.get(run_id).and_then(|entries| {
            entries
                .iter()
                .max_by_key(|e| (e.checkpoint.created_at, e.seq))
                .map(|e| e.checkpoint.clone())
        }))
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let mut inner = self.lock();
        inner.purge_expired();
        Ok(inner
            .runs
            .values()
            .flatten()
            .find(|e| e.checkpoint.id == checkpoint_id)
            .map(|e| e.checkpoint.clone()))
    }

    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointMeta>> {
        let mut inner = self.lock();
        inner.purge_expired();
        let mut entries: Vec<(chrono::DateTime<chrono::Utc>, u64, CheckpointMeta)> = inner
            .runs
            .get(run_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.checkpoint.created_at, e.seq, e.checkpoint.meta()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        Ok(entries.into_iter().map(|(_, _, meta)| meta).collect())
    }

    async fn delete_after(&self, run_id: &str, checkpoint_id: &str) -> Result<RollbackOutcome> {
        let mut inner = self.lock();
        inner.purge_expired();

        let Some(owner_entry) = inner
            .runs
            .values()
            .flatten()
            .find(|e| e.checkpoint.id == checkpoint_id)
        else {
            return Ok(RollbackOutcome::NotFound);
        };

        if owner_entry.checkpoint.run_id != run_id {
            return Ok(RollbackOutcome::WrongRun {
                owner: owner_entry.checkpoint.run_id.clone(),
            });
        }

        let target = owner_entry.checkpoint.clone();
        let cutoff = (owner_entry.checkpoint.created_at, owner_entry.seq);
        if let Some(entries) = inner.runs.get_mut(run_id) {
            entries.retain(|e| (e.checkpoint.created_at, e.seq) <= cutoff);
        }
        Ok(RollbackOutcome::RolledBack(target))
    }

    async fn delete_run(&self, run_id: &str) -> Result<usize> {
        let mut inner = self.lock();
        inner.purge_expired();
        Ok(inner.runs.remove(run_id).map(|v| v.len()).unwrap_or(0))
    }
}
