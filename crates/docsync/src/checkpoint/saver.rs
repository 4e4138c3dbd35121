//! Batched checkpoint persistence.
//!
//! Checkpointing every document would dominate I/O at scale, so the saver
//! persists only after N completed batches or T elapsed seconds, whichever
//! comes first. Queries always reflect the latest in-memory state;
//! correctness of resume does not depend on checkpoint granularity being
//! per-document.

use super::{CheckpointState, CompletedDocsCache};
use crate::error::Result;
use crate::stats::Stats;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// When to persist: after this many batches, or this much wall-clock time
/// since the last persist.
#[derive(Debug, Clone, Copy)]
pub struct SaverThresholds {
    pub batch_interval: u32,
    pub time_interval: Duration,
}

impl Default for SaverThresholds {
    fn default() -> Self {
        Self {
            batch_interval: 10,
            time_interval: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: CheckpointState,
    cache: CompletedDocsCache,
    batches_since_save: u32,
    last_save: Instant,
    dirty: bool,
}

/// Owns the decision of when transfer progress is persisted.
///
/// All checkpoint mutation from concurrent collection transfers goes
/// through these methods; the mutex keeps the cache and the on-disk
/// representation consistent.
pub struct StateSaver {
    path: PathBuf,
    thresholds: SaverThresholds,
    max_backups: usize,
    inner: Mutex<Inner>,
}

impl StateSaver {
    /// Wrap a checkpoint (fresh or loaded) for incremental persistence.
    pub fn new(
        path: PathBuf,
        state: CheckpointState,
        thresholds: SaverThresholds,
        max_backups: usize,
    ) -> Self {
        let cache = CompletedDocsCache::from_record(&state.completed_docs);
        Self {
            path,
            thresholds,
            max_backups,
            inner: Mutex::new(Inner {
                state,
                cache,
                batches_since_save: 0,
                last_save: Instant::now(),
                dirty: false,
            }),
        }
    }

    /// Record a completed batch: ids enter the cache and the stats
    /// snapshot updates immediately; the file is written only when a
    /// threshold is crossed.
    pub async fn mark_batch_completed(
        &self,
        collection: &str,
        ids: &[String],
        stats: &Stats,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cache.add_batch(collection, ids.iter().cloned());
        inner.state.stats = stats.clone();
        inner.batches_since_save += 1;
        inner.dirty = true;

        if inner.batches_since_save >= self.thresholds.batch_interval
            || inner.last_save.elapsed() >= self.thresholds.time_interval
        {
            self.persist(&mut inner)?;
        }
        Ok(())
    }

    /// Force an immediate persist. No-op when nothing changed since the
    /// last write, so the file's timestamp is not churned.
    pub async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.dirty {
            self.persist(&mut inner)?;
        }
        Ok(())
    }

    /// Whether a document was completed, persisted or not.
    pub async fn is_completed(&self, collection: &str, id: &str) -> bool {
        self.inner.lock().await.cache.has(collection, id)
    }

    /// Total completed documents, persisted or not.
    pub async fn completed_count(&self) -> usize {
        self.inner.lock().await.cache.total_count()
    }

    /// Snapshot of the live checkpoint state, including unpersisted
    /// completions.
    pub async fn snapshot(&self) -> CheckpointState {
        let inner = self.inner.lock().await;
        let mut state = inner.state.clone();
        state.completed_docs = inner.cache.to_record();
        state
    }

    fn persist(&self, inner: &mut Inner) -> Result<()> {
        inner.state.completed_docs = inner.cache.to_record();
        super::save(&self.path, &mut inner.state, self.max_backups)?;
        inner.batches_since_save = 0;
        inner.last_save = Instant::now();
        inner.dirty = false;
        debug!(
            "checkpoint persisted ({} completed documents)",
            inner.cache.total_count()
        );
        Ok(())
    }
}
