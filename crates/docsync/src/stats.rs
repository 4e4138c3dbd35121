//! Aggregate run counters and conflict records.

use serde::{Deserialize, Serialize};

/// Mutable counters for a transfer run.
///
/// Owned by the orchestrator; mutated by the transfer core and the
/// orphan-deletion routine. All mutation from concurrent collection
/// transfers goes through a `tokio::sync::Mutex`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Collections fully processed.
    pub collections_processed: u64,

    /// Documents written to the destination (or that would be, in dry-run).
    pub documents_transferred: u64,

    /// Documents deleted from the destination (clear + orphan sync).
    pub documents_deleted: u64,

    /// Per-document and per-collection errors that did not abort the run.
    pub errors: u64,

    /// Conflicts recorded by the pre-write version check.
    pub conflicts: u64,

    /// Count mismatches found by post-transfer verification.
    pub integrity_errors: u64,
}

/// Record of a destination document whose version marker changed between
/// being read for comparison and being overwritten.
///
/// Conflicts are recorded and counted but never block the write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub collection: String,
    pub document_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_is_zeroed() {
        let stats = Stats::default();
        assert_eq!(stats.documents_transferred, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_stats_round_trip() {
        let stats = Stats {
            collections_processed: 2,
            documents_transferred: 1250,
            documents_deleted: 3,
            errors: 1,
            conflicts: 4,
            integrity_errors: 0,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let loaded: Stats = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, stats);
    }
}
