//! Configuration type definitions.

use crate::store::FieldFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Largest batch the store commits atomically.
pub const MAX_BATCH_SIZE: usize = 500;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source store endpoint.
    pub source: StoreEndpoint,

    /// Destination store endpoint.
    pub destination: StoreEndpoint,

    /// Transfer behavior configuration.
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// One store endpoint resolved from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEndpoint {
    /// Backend type: "file" or "memory".
    #[serde(rename = "type", default = "default_store_type")]
    pub kind: String,

    /// Backing file for the "file" type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Stable identity recorded in checkpoints and compared on resume.
    /// Defaults to the backing path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Immutable parameters for one transfer run. Constructed once, read-only
/// for the duration of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Root collections to transfer.
    #[serde(default)]
    pub collections: Vec<String>,

    /// Descend into sub-collections.
    #[serde(default)]
    pub recursive: bool,

    /// Perform every step except the actual writes.
    #[serde(default)]
    pub dry_run: bool,

    /// Writes per committed batch (max 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-collection document limit, applied at the root level only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Retry count for batch commits.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Field filters, applied at the root level only.
    #[serde(default)]
    pub filters: Vec<FieldFilter>,

    /// Sub-collection names (exact or `*` glob) to skip.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Merge into existing destination documents instead of replacing.
    #[serde(default)]
    pub merge: bool,

    /// Concurrent collection transfers. 1 = sequential.
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Delete all destination documents before transferring.
    #[serde(default)]
    pub clear_destination: bool,

    /// Delete destination documents whose ids are absent from the source.
    #[serde(default)]
    pub sync_deletes: bool,

    /// Root collection renames, source name → destination name.
    #[serde(default)]
    pub rename: HashMap<String, String>,

    /// Prefix prepended to every destination document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,

    /// Suffix appended to every destination document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_suffix: Option<String>,

    /// Maximum recursion depth. 0 = unlimited.
    #[serde(default)]
    pub max_depth: u32,

    /// Record destination documents whose version marker changed between
    /// read and overwrite. Conflicts never block the write.
    #[serde(default)]
    pub detect_conflicts: bool,

    /// Compare per-collection counts after the transfer.
    #[serde(default)]
    pub verify: bool,

    /// Checkpoint file location.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// Resume from an existing checkpoint.
    #[serde(default)]
    pub resume: bool,

    /// Destination writes admitted per second. 0 = unlimited.
    #[serde(default)]
    pub rate_limit_per_sec: u32,

    /// Persist the checkpoint every N completed batches.
    #[serde(default = "default_checkpoint_batches")]
    pub checkpoint_batch_interval: u32,

    /// Persist the checkpoint at least every N seconds while batches
    /// complete.
    #[serde(default = "default_checkpoint_secs")]
    pub checkpoint_time_interval_secs: u64,

    /// Rotated checkpoint backups to keep. 0 disables rotation.
    #[serde(default = "default_checkpoint_backups")]
    pub checkpoint_max_backups: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            recursive: false,
            dry_run: false,
            batch_size: default_batch_size(),
            limit: None,
            retries: default_retries(),
            filters: Vec::new(),
            exclude: Vec::new(),
            merge: false,
            parallel: default_parallel(),
            clear_destination: false,
            sync_deletes: false,
            rename: HashMap::new(),
            id_prefix: None,
            id_suffix: None,
            max_depth: 0,
            detect_conflicts: false,
            verify: false,
            checkpoint_path: default_checkpoint_path(),
            resume: false,
            rate_limit_per_sec: 0,
            checkpoint_batch_interval: default_checkpoint_batches(),
            checkpoint_time_interval_secs: default_checkpoint_secs(),
            checkpoint_max_backups: default_checkpoint_backups(),
        }
    }
}

impl TransferConfig {
    /// Destination name of a root collection under the rename map.
    /// Inner path segments are never renamed.
    pub fn mapped_collection(&self, source: &str) -> String {
        self.rename
            .get(source)
            .cloned()
            .unwrap_or_else(|| source.to_string())
    }

    /// Destination id for a source document id (prefix/suffix applied).
    pub fn mapped_id(&self, id: &str) -> String {
        format!(
            "{}{}{}",
            self.id_prefix.as_deref().unwrap_or(""),
            id,
            self.id_suffix.as_deref().unwrap_or("")
        )
    }
}

// Default value functions for serde

fn default_store_type() -> String {
    "file".to_string()
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_retries() -> u32 {
    3
}

fn default_parallel() -> usize {
    1
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("docsync-checkpoint.json")
}

fn default_checkpoint_batches() -> u32 {
    10
}

fn default_checkpoint_secs() -> u64 {
    30
}

fn default_checkpoint_backups() -> usize {
    3
}
