//! Transfer orchestrator - main workflow coordinator.
//!
//! Linear state machine with optional branches: resume check, transform
//! validation, counting, optional destructive clear, transfer, optional
//! orphan sync, optional verification, checkpoint teardown, report. The
//! whole run is wrapped so any failure still produces a structured outcome
//! with partial stats, and both stores are closed best-effort.

use crate::checkpoint::{self, CheckpointState, SaverThresholds, StateSaver};
use crate::config::{Config, TransferConfig};
use crate::error::{Result, SyncError};
use crate::executor::run_bounded;
use crate::stats::{ConflictInfo, Stats};
use crate::store::{open_store, DocumentQuery, DocumentStore};
use crate::transfer::{TransferContext, TransferEngine};
use crate::transform::{DocumentTransform, TransformContext};
use crate::verify::{verify_counts, VerifyReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Transfer orchestrator.
pub struct Orchestrator {
    transfer: Arc<TransferConfig>,
    source: Arc<dyn DocumentStore>,
    destination: Arc<dyn DocumentStore>,
    transform: Option<Arc<dyn DocumentTransform>>,
}

/// Result of a transfer run — the single value the CLI layer consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Unique run identifier.
    pub run_id: String,

    /// Whether the run completed without a fatal error or failed
    /// collections.
    pub success: bool,

    /// Whether this was a dry run (no writes were committed).
    pub dry_run: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Aggregate counters, partial on failure.
    pub stats: Stats,

    /// Conflicts recorded by the pre-write version check.
    pub conflicts: Vec<ConflictInfo>,

    /// Collections whose transfer failed.
    pub failed_collections: Vec<String>,

    /// Top-level error message when the run failed fatally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Verification report when verification ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyReport>,
}

impl TransferOutcome {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct RunArtifacts {
    verify: Option<VerifyReport>,
    failed_collections: Vec<String>,
}

impl Orchestrator {
    /// Create an orchestrator, opening both stores from the configured
    /// endpoints.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = open_store(&config.source).await?;
        let destination = open_store(&config.destination).await?;
        Ok(Self {
            transfer: Arc::new(config.transfer),
            source,
            destination,
            transform: None,
        })
    }

    /// Create an orchestrator over already-opened stores. Used by hosts
    /// embedding the engine and by tests.
    pub fn from_stores(
        transfer: TransferConfig,
        source: Arc<dyn DocumentStore>,
        destination: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            transfer: Arc::new(transfer),
            source,
            destination,
            transform: None,
        }
    }

    /// Attach a per-document transform.
    pub fn with_transform(mut self, transform: Arc<dyn DocumentTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Run the transfer. Always returns a structured outcome; a fatal
    /// error is reported through `outcome.error` alongside whatever
    /// partial stats had accumulated.
    pub async fn run(self) -> TransferOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let timer = Instant::now();
        let stats = Arc::new(Mutex::new(Stats::default()));
        let conflicts = Arc::new(Mutex::new(Vec::new()));

        info!(
            "starting transfer run {} ({} collections, parallel={}{})",
            run_id,
            self.transfer.collections.len(),
            self.transfer.parallel,
            if self.transfer.dry_run { ", dry-run" } else { "" }
        );

        let result = self.execute(&stats, &conflicts).await;

        for (label, store) in [("source", &self.source), ("destination", &self.destination)] {
            if let Err(e) = store.close().await {
                warn!("failed to close {} store: {}", label, e);
            }
        }

        let stats = stats.lock().await.clone();
        let conflicts = conflicts.lock().await.clone();
        let completed_at = Utc::now();
        let duration_seconds = timer.elapsed().as_secs_f64();

        match result {
            Ok(artifacts) => {
                let success = artifacts.failed_collections.is_empty();
                info!(
                    "run {} {}{}: {} collections, {} documents, {} deleted, {} errors, {} conflicts in {:.1}s",
                    run_id,
                    if success { "completed" } else { "completed with failures" },
                    if self.transfer.dry_run { " (dry-run)" } else { "" },
                    stats.collections_processed,
                    stats.documents_transferred,
                    stats.documents_deleted,
                    stats.errors,
                    stats.conflicts,
                    duration_seconds
                );
                TransferOutcome {
                    run_id,
                    success,
                    dry_run: self.transfer.dry_run,
                    duration_seconds,
                    started_at,
                    completed_at,
                    stats,
                    conflicts,
                    failed_collections: artifacts.failed_collections,
                    error: None,
                    verify: artifacts.verify,
                }
            }
            Err(e) => {
                error!("run {} failed: {}", run_id, e.format_detailed());
                TransferOutcome {
                    run_id,
                    success: false,
                    dry_run: self.transfer.dry_run,
                    duration_seconds,
                    started_at,
                    completed_at,
                    stats,
                    conflicts,
                    failed_collections: Vec::new(),
                    error: Some(e.to_string()),
                    verify: None,
                }
            }
        }
    }

    async fn execute(
        &self,
        stats: &Arc<Mutex<Stats>>,
        conflicts: &Arc<Mutex<Vec<ConflictInfo>>>,
    ) -> Result<RunArtifacts> {
        let config = Arc::clone(&self.transfer);

        // Resume or create the checkpoint before anything is written.
        let saver = self.prepare_checkpoint(stats).await?;

        let mut ctx = TransferContext::new(
            Arc::clone(&self.source),
            Arc::clone(&self.destination),
            Arc::clone(&config),
        )?;
        ctx.stats = Arc::clone(stats);
        ctx.conflicts = Arc::clone(conflicts);
        ctx.transform = self.transform.clone();
        ctx.saver = saver.clone();
        let engine = Arc::new(TransferEngine::new(ctx));

        if self.transform.is_some() {
            self.validate_transform().await?;
        }

        // Counting is best-effort estimation, deliberately not retried.
        for name in &config.collections {
            match engine.count_collection(name).await {
                Ok(n) => info!("'{}': {} documents to transfer", name, n),
                Err(e) => warn!("'{}': count failed: {}", name, e),
            }
        }

        if config.clear_destination {
            for name in &config.collections {
                engine.clear_destination_collection(name).await?;
            }
        }

        let failed_collections = self.transfer_all(&engine, stats).await;

        if config.sync_deletes {
            for name in &config.collections {
                if let Err(e) = engine.sync_orphans(name).await {
                    error!("'{}': orphan sync failed: {}", name, e);
                    stats.lock().await.errors += 1;
                }
            }
        }

        let verify = if config.verify {
            let report = verify_counts(&self.source, &self.destination, &config).await?;
            let mismatches = report.mismatches();
            if mismatches > 0 {
                stats.lock().await.integrity_errors += mismatches;
            }
            Some(report)
        } else {
            None
        };

        if let Some(saver) = &saver {
            saver.flush().await?;
        }
        if !config.dry_run {
            if failed_collections.is_empty() {
                checkpoint::delete(&config.checkpoint_path)?;
                info!("checkpoint removed after successful run");
            } else {
                info!(
                    "checkpoint retained at {} for resume",
                    config.checkpoint_path.display()
                );
            }
        }

        Ok(RunArtifacts {
            verify,
            failed_collections,
        })
    }

    /// Dispatch collection transfers: bounded fan-out when parallel > 1,
    /// otherwise strictly in configuration order. A single collection's
    /// failure never stops the remaining collections.
    async fn transfer_all(
        &self,
        engine: &Arc<TransferEngine>,
        stats: &Arc<Mutex<Stats>>,
    ) -> Vec<String> {
        let config = &self.transfer;
        let mut failed = Vec::new();

        if config.parallel > 1 {
            let engine_ref = Arc::clone(engine);
            let output = run_bounded(
                config.collections.clone(),
                config.parallel,
                move |name: String| {
                    let engine = Arc::clone(&engine_ref);
                    async move {
                        engine
                            .transfer_collection(&name)
                            .await
                            .map_err(|e| SyncError::transfer(name.clone(), e.to_string()))?;
                        Ok(name)
                    }
                },
            )
            .await;

            for err in output.errors {
                error!("collection transfer failed: {}", err);
                stats.lock().await.errors += 1;
                if let SyncError::Transfer { collection, .. } = err {
                    failed.push(collection);
                }
            }
        } else {
            for name in &config.collections {
                if let Err(e) = engine.transfer_collection(name).await {
                    error!("'{}': transfer failed: {}", name, e);
                    stats.lock().await.errors += 1;
                    failed.push(name.clone());
                }
            }
        }

        failed
    }

    /// Resume from an existing checkpoint or persist a fresh one, so even
    /// an immediate crash leaves a resumable marker. Dry runs never touch
    /// the checkpoint.
    async fn prepare_checkpoint(
        &self,
        stats: &Arc<Mutex<Stats>>,
    ) -> Result<Option<Arc<StateSaver>>> {
        let config = &self.transfer;
        if config.dry_run {
            info!("dry-run: checkpoint will not be created");
            return Ok(None);
        }

        let state = if config.resume {
            let state = checkpoint::load(&config.checkpoint_path).ok_or_else(|| {
                SyncError::Checkpoint(format!(
                    "no resumable checkpoint at {}",
                    config.checkpoint_path.display()
                ))
            })?;

            let issues = state.validate_for_resume(
                config,
                self.source.identity(),
                self.destination.identity(),
            );
            if !issues.is_empty() {
                return Err(SyncError::ResumeIncompatible(issues.join("; ")));
            }

            *stats.lock().await = state.stats.clone();
            info!(
                "resuming from checkpoint: {} documents already completed",
                state.completed_total()
            );
            state
        } else {
            let mut state = CheckpointState::create_initial(
                config,
                self.source.identity(),
                self.destination.identity(),
            );
            checkpoint::save(
                &config.checkpoint_path,
                &mut state,
                config.checkpoint_max_backups,
            )?;
            state
        };

        let thresholds = SaverThresholds {
            batch_interval: config.checkpoint_batch_interval,
            time_interval: Duration::from_secs(config.checkpoint_time_interval_secs),
        };
        Ok(Some(Arc::new(StateSaver::new(
            config.checkpoint_path.clone(),
            state,
            thresholds,
            config.checkpoint_max_backups,
        ))))
    }

    /// Apply the transform to one sampled document so a broken transform
    /// fails fast, before any write occurs.
    async fn validate_transform(&self) -> Result<()> {
        let Some(transform) = &self.transform else {
            return Ok(());
        };
        let Some(first) = self.transfer.collections.first() else {
            return Ok(());
        };

        let query = DocumentQuery {
            limit: Some(1),
            ..DocumentQuery::default()
        };
        let docs = self.source.query_documents(first, &query).await?;
        if let Some(doc) = docs.first() {
            transform
                .apply(
                    doc.data.clone(),
                    &TransformContext {
                        id: &doc.id,
                        path: &doc.path,
                    },
                )
                .map_err(|e| {
                    SyncError::Transform(format!(
                        "transform failed validation against {}: {}",
                        doc.path, e
                    ))
                })?;
            info!("transform validated against '{}'", doc.path);
        }
        Ok(())
    }

    /// Count the documents each configured collection would transfer.
    pub async fn count(&self) -> Result<Vec<(String, u64)>> {
        let ctx = TransferContext::new(
            Arc::clone(&self.source),
            Arc::clone(&self.destination),
            Arc::clone(&self.transfer),
        )?;
        let engine = TransferEngine::new(ctx);

        let mut counts = Vec::with_capacity(self.transfer.collections.len());
        for name in &self.transfer.collections {
            counts.push((name.clone(), engine.count_collection(name).await?));
        }
        Ok(counts)
    }

    /// Compare per-collection counts between source and destination.
    pub async fn verify(&self) -> Result<VerifyReport> {
        verify_counts(&self.source, &self.destination, &self.transfer).await
    }
}
