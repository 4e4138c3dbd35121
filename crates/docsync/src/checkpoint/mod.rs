//! Durable transfer-progress checkpoints for resume capability.
//!
//! The checkpoint file is schema-versioned pretty JSON, written atomically
//! (temp file + rename) so a crash mid-write never leaves a truncated
//! checkpoint. The previous file rotates into numbered backups, oldest
//! evicted.

mod cache;
mod saver;

pub use cache::CompletedDocsCache;
pub use saver::{SaverThresholds, StateSaver};

use crate::config::TransferConfig;
use crate::error::Result;
use crate::fsutil::write_json_atomic;
use crate::stats::Stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Current checkpoint schema version. Checkpoints written by a different
/// version are rejected on load.
pub const CHECKPOINT_VERSION: u32 = 2;

/// Durable representation of transfer progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Checkpoint schema version.
    pub version: u32,

    /// Identity of the source store.
    pub source: String,

    /// Identity of the destination store.
    pub destination: String,

    /// Root collections configured for the run.
    pub collections: Vec<String>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the checkpoint was last persisted.
    pub updated_at: DateTime<Utc>,

    /// Collection path → ids of documents already transferred.
    pub completed_docs: HashMap<String, Vec<String>>,

    /// Snapshot of the run counters at the last persist.
    pub stats: Stats,
}

impl CheckpointState {
    /// Fresh checkpoint for a new run: current schema version, zeroed
    /// stats, no completed documents.
    pub fn create_initial(config: &TransferConfig, source: &str, destination: &str) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            source: source.to_string(),
            destination: destination.to_string(),
            collections: config.collections.clone(),
            started_at: now,
            updated_at: now,
            completed_docs: HashMap::new(),
            stats: Stats::default(),
        }
    }

    /// Check whether this checkpoint can seed the given run. Returns one
    /// human-readable message per mismatch; an empty list means resume is
    /// safe. Never mutates or repairs state.
    pub fn validate_for_resume(
        &self,
        config: &TransferConfig,
        source: &str,
        destination: &str,
    ) -> Vec<String> {
        let mut issues = Vec::new();

        if self.source != source {
            issues.push(format!(
                "source mismatch: checkpoint was created against '{}', current source is '{}'",
                self.source, source
            ));
        }
        if self.destination != destination {
            issues.push(format!(
                "destination mismatch: checkpoint was created against '{}', current destination is '{}'",
                self.destination, destination
            ));
        }
        for name in &self.collections {
            if !config.collections.contains(name) {
                issues.push(format!(
                    "collection '{}' is recorded in the checkpoint but missing from the configured collection list",
                    name
                ));
            }
        }

        issues
    }

    /// Total number of completed document ids across all collections.
    pub fn completed_total(&self) -> usize {
        self.completed_docs.values().map(|ids| ids.len()).sum()
    }
}

/// Load a checkpoint. Returns `None` — never an error — when the file is
/// absent, unparsable, or carries a different schema version; the caller
/// decides whether that refuses a resume.
pub fn load(path: &Path) -> Option<CheckpointState> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("checkpoint at {} is unreadable: {}", path.display(), e);
            return None;
        }
    };

    let state: CheckpointState = match serde_json::from_str(&content) {
        Ok(state) => state,
        Err(e) => {
            warn!("checkpoint at {} is unparsable: {}", path.display(), e);
            return None;
        }
    };

    if state.version != CHECKPOINT_VERSION {
        warn!(
            "checkpoint at {} has schema version {} (expected {}), ignoring",
            path.display(),
            state.version,
            CHECKPOINT_VERSION
        );
        return None;
    }

    Some(state)
}

/// Persist a checkpoint: stamp `updated_at`, rotate any existing file into
/// the backup chain, then write atomically.
pub fn save(path: &Path, state: &mut CheckpointState, max_backups: usize) -> Result<()> {
    state.updated_at = Utc::now();

    if path.exists() && max_backups > 0 {
        rotate_backups(path, max_backups)?;
    }

    write_json_atomic(path, state)?;
    debug!("checkpoint saved to {}", path.display());
    Ok(())
}

/// Remove a checkpoint and its rotated backups. Best-effort: absence is
/// not an error.
pub fn delete(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let mut index = 1;
    loop {
        let backup = backup_path(path, index);
        match std::fs::remove_file(&backup) {
            Ok(()) => index += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    PathBuf::from(format!("{}.bak.{}", path.display(), index))
}

/// Shift `.bak.1 → .bak.2 → …`, evicting the oldest beyond `max_backups`,
/// then move the current file to `.bak.1`.
fn rotate_backups(path: &Path, max_backups: usize) -> Result<()> {
    let _ = std::fs::remove_file(backup_path(path, max_backups));

    for index in (1..max_backups).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            std::fs::rename(&from, backup_path(path, index + 1))?;
        }
    }

    std::fs::rename(path, backup_path(path, 1))?;
    Ok(())
}
