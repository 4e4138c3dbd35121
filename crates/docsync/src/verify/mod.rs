//! Post-transfer count verification.
//!
//! Compares per-collection document counts between source and destination
//! under the collection rename map. Root collections only; sub-collection
//! trees are covered by the transfer's own resume bookkeeping.

use crate::config::TransferConfig;
use crate::error::Result;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Verification result for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionVerify {
    pub collection: String,
    pub destination: String,
    pub source_count: u64,
    pub destination_count: u64,
    pub matched: bool,
}

/// Verification result for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub collections: Vec<CollectionVerify>,
    pub passed: bool,
}

impl VerifyReport {
    pub fn mismatches(&self) -> u64 {
        self.collections.iter().filter(|c| !c.matched).count() as u64
    }
}

/// Compare counts for every configured collection. The source side uses
/// the run's filters and limit so the expectation matches what was
/// actually transferred.
pub async fn verify_counts(
    source: &Arc<dyn DocumentStore>,
    destination: &Arc<dyn DocumentStore>,
    config: &TransferConfig,
) -> Result<VerifyReport> {
    let mut collections = Vec::with_capacity(config.collections.len());

    for name in &config.collections {
        let dest_name = config.mapped_collection(name);

        let mut source_count = source.aggregate_count(name, &config.filters).await?;
        if let Some(limit) = config.limit {
            source_count = source_count.min(limit as u64);
        }
        let destination_count = destination.aggregate_count(&dest_name, &[]).await?;

        let matched = source_count == destination_count;
        if matched {
            info!("verify '{}': {} documents (match)", name, source_count);
        } else {
            warn!(
                "verify '{}': source={} destination={} (MISMATCH)",
                name, source_count, destination_count
            );
        }

        collections.push(CollectionVerify {
            collection: name.clone(),
            destination: dest_name,
            source_count,
            destination_count,
            matched,
        });
    }

    let passed = collections.iter().all(|c| c.matched);
    Ok(VerifyReport {
        collections,
        passed,
    })
}
