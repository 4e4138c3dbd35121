//! Recursive collection traversal and batched transfer.
//!
//! One walk shape serves four operations: transfer, clear, count, and
//! orphan sync. Within a collection, batches are committed in the order
//! documents were read; across collections no ordering is guaranteed.
//! Every batch commit goes through the retry policy and is gated by the
//! rate limiter; every completed batch updates the state saver with
//! exactly the document ids that were staged.

use crate::checkpoint::StateSaver;
use crate::config::TransferConfig;
use crate::error::Result;
use crate::pattern::ExcludePatterns;
use crate::rate_limit::WriteRateLimiter;
use crate::retry::RetryPolicy;
use crate::stats::{ConflictInfo, Stats};
use crate::store::{Document, DocumentQuery, DocumentStore, WriteBatch, WriteOp};
use crate::transform::{DocumentTransform, TransformAction, TransformContext};
use async_recursion::async_recursion;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything a transfer run shares across collections. Explicitly
/// constructed and passed in — no global handles — so multiple runs can
/// coexist in one process and tests can inject fakes.
pub struct TransferContext {
    pub source: Arc<dyn DocumentStore>,
    pub destination: Arc<dyn DocumentStore>,
    pub config: Arc<TransferConfig>,
    pub excludes: ExcludePatterns,
    pub retry: RetryPolicy,
    pub limiter: Option<Arc<WriteRateLimiter>>,
    pub transform: Option<Arc<dyn DocumentTransform>>,
    pub saver: Option<Arc<StateSaver>>,
    pub stats: Arc<Mutex<Stats>>,
    pub conflicts: Arc<Mutex<Vec<ConflictInfo>>>,
}

impl TransferContext {
    /// Context with derived components built from the config and no
    /// transform or saver attached.
    pub fn new(
        source: Arc<dyn DocumentStore>,
        destination: Arc<dyn DocumentStore>,
        config: Arc<TransferConfig>,
    ) -> Result<Self> {
        let excludes = ExcludePatterns::new(&config.exclude)?;
        let retry = RetryPolicy::new(config.retries);
        let limiter = WriteRateLimiter::from_rate(config.rate_limit_per_sec);
        Ok(Self {
            source,
            destination,
            config,
            excludes,
            retry,
            limiter,
            transform: None,
            saver: None,
            stats: Arc::new(Mutex::new(Stats::default())),
            conflicts: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

/// Version marker captured when a destination document was inspected,
/// re-checked immediately before its batch commits.
struct CapturedVersion {
    dest_path: String,
    source_id: String,
    seen: Option<DateTime<Utc>>,
}

/// Writes staged for the current batch of one collection level.
#[derive(Default)]
struct Staged {
    ops: Vec<WriteOp>,
    /// Source ids done in this batch — includes transform-skips, which
    /// still count as completed for resume purposes.
    ids: Vec<String>,
    captured: Vec<CapturedVersion>,
}

/// The traversal/transfer core.
pub struct TransferEngine {
    ctx: TransferContext,
}

impl TransferEngine {
    pub fn new(ctx: TransferContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &TransferContext {
        &self.ctx
    }

    /// Transfer one root collection and (when enabled) its sub-collection
    /// tree. Errors propagate after retries exhaust; the orchestrator
    /// decides whether the run continues.
    pub async fn transfer_collection(&self, collection: &str) -> Result<()> {
        let dest_root = self.ctx.config.mapped_collection(collection);
        info!(
            "transferring collection '{}' -> '{}'{}",
            collection,
            dest_root,
            if self.ctx.config.dry_run { " (dry-run)" } else { "" }
        );

        self.transfer_level(collection, &dest_root, 0).await?;

        let mut stats = self.ctx.stats.lock().await;
        stats.collections_processed += 1;
        Ok(())
    }

    #[async_recursion]
    async fn transfer_level(&self, source_path: &str, dest_path: &str, depth: u32) -> Result<()> {
        let config = &self.ctx.config;

        // Filters and limits apply at the root level only; nested
        // sub-collections are always transferred whole.
        let query = if depth == 0 {
            DocumentQuery {
                filters: config.filters.clone(),
                limit: config.limit,
                ids_only: false,
            }
        } else {
            DocumentQuery::default()
        };

        let docs = self.ctx.source.query_documents(source_path, &query).await?;
        debug!(
            "{}: read {} documents at depth {}",
            source_path,
            docs.len(),
            depth
        );

        let mut staged = Staged::default();

        for doc in &docs {
            let already_done = match &self.ctx.saver {
                Some(saver) => saver.is_completed(source_path, &doc.id).await,
                None => false,
            };

            if already_done {
                debug!("{}: already transferred, skipping", doc.path);
            } else {
                if let Err(e) = self.process_document(doc, dest_path, &mut staged).await {
                    warn!("{}: document error: {}", doc.path, e);
                    self.ctx.stats.lock().await.errors += 1;
                }

                if staged.ops.len() >= config.batch_size {
                    self.commit_staged(source_path, &mut staged).await?;
                }
            }

            // Descend even under already-done parents: a crashed run may
            // have recorded the parent before finishing its children.
            if config.recursive && (config.max_depth == 0 || depth < config.max_depth) {
                self.transfer_subcollections(doc, dest_path, depth).await?;
            }
        }

        if !staged.ids.is_empty() || !staged.ops.is_empty() {
            self.commit_staged(source_path, &mut staged).await?;
        }

        Ok(())
    }

    async fn transfer_subcollections(
        &self,
        doc: &Document,
        dest_collection: &str,
        depth: u32,
    ) -> Result<()> {
        let subcollections = self.ctx.source.list_subcollections(&doc.path).await?;
        if subcollections.is_empty() {
            return Ok(());
        }

        let dest_doc_path = format!("{}/{}", dest_collection, self.ctx.config.mapped_id(&doc.id));
        for name in subcollections {
            if self.ctx.excludes.matches(&name) {
                debug!("{}/{}: excluded, skipping", doc.path, name);
                continue;
            }
            let source_sub = format!("{}/{}", doc.path, name);
            let dest_sub = format!("{}/{}", dest_doc_path, name);
            self.transfer_level(&source_sub, &dest_sub, depth + 1).await?;
        }
        Ok(())
    }

    /// Apply transform, id remapping, and the conflict capture to one
    /// document, then stage its write.
    async fn process_document(
        &self,
        doc: &Document,
        dest_collection: &str,
        staged: &mut Staged,
    ) -> Result<()> {
        let config = &self.ctx.config;

        let action = match &self.ctx.transform {
            Some(transform) => transform.apply(
                doc.data.clone(),
                &TransformContext {
                    id: &doc.id,
                    path: &doc.path,
                },
            )?,
            None => TransformAction::Keep(doc.data.clone()),
        };

        match action {
            TransformAction::Skip => {
                debug!("{}: skipped by transform", doc.path);
                staged.ids.push(doc.id.clone());
            }
            TransformAction::Keep(data) => {
                let dest_doc_path = format!("{}/{}", dest_collection, config.mapped_id(&doc.id));

                if config.detect_conflicts {
                    let seen = self.ctx.destination.update_time(&dest_doc_path).await?;
                    staged.captured.push(CapturedVersion {
                        dest_path: dest_doc_path.clone(),
                        source_id: doc.id.clone(),
                        seen,
                    });
                }

                staged.ops.push(WriteOp::Upsert {
                    path: dest_doc_path,
                    data,
                    merge: config.merge,
                });
                staged.ids.push(doc.id.clone());
            }
        }
        Ok(())
    }

    /// Commit the staged batch through retry and the rate limiter, then
    /// record its ids with the state saver.
    async fn commit_staged(&self, collection: &str, staged: &mut Staged) -> Result<()> {
        let ops = std::mem::take(&mut staged.ops);
        let ids = std::mem::take(&mut staged.ids);
        let captured = std::mem::take(&mut staged.captured);

        if !ops.is_empty() {
            if self.ctx.config.detect_conflicts && !captured.is_empty() {
                self.record_conflicts(collection, &captured).await;
            }

            if self.ctx.config.dry_run {
                debug!(
                    "{}: dry-run, skipping commit of {} writes",
                    collection,
                    ops.len()
                );
            } else {
                if let Some(limiter) = &self.ctx.limiter {
                    limiter.acquire(ops.len() as u32).await;
                }

                let destination = Arc::clone(&self.ctx.destination);
                self.ctx
                    .retry
                    .run(collection, || {
                        let destination = Arc::clone(&destination);
                        let batch = WriteBatch { ops: ops.clone() };
                        async move { destination.commit(batch).await }
                    })
                    .await?;
            }
        }

        let snapshot = {
            let mut stats = self.ctx.stats.lock().await;
            stats.documents_transferred += ops.len() as u64;
            stats.clone()
        };

        if let Some(saver) = &self.ctx.saver {
            saver.mark_batch_completed(collection, &ids, &snapshot).await?;
        }

        debug!(
            "{}: batch committed ({} writes, {} done)",
            collection,
            ops.len(),
            ids.len()
        );
        Ok(())
    }

    /// Re-read version markers right before the overwrite. A changed
    /// marker is recorded and counted but never blocks the write.
    async fn record_conflicts(&self, collection: &str, captured: &[CapturedVersion]) {
        for cap in captured {
            match self.ctx.destination.update_time(&cap.dest_path).await {
                Ok(current) => {
                    if current != cap.seen && cap.seen.is_some() {
                        let reason = format!(
                            "destination version changed from {} to {} before overwrite",
                            format_marker(cap.seen),
                            format_marker(current)
                        );
                        warn!("{}: conflict on '{}': {}", collection, cap.source_id, reason);
                        self.ctx.conflicts.lock().await.push(ConflictInfo {
                            collection: collection.to_string(),
                            document_id: cap.source_id.clone(),
                            reason,
                        });
                        self.ctx.stats.lock().await.conflicts += 1;
                    }
                }
                Err(e) => warn!("{}: conflict check failed: {}", cap.dest_path, e),
            }
        }
    }

    /// Delete every document under a destination collection, clearing
    /// sub-collections depth-first before the parent's own documents.
    /// `bounded` makes the walk honor the recursion flag and depth limit;
    /// orphan cleanup passes `false` to always remove whole subtrees.
    #[async_recursion]
    async fn clear_level(&self, path: &str, depth: u32, bounded: bool) -> Result<u64> {
        let config = &self.ctx.config;
        let ids = self.ctx.destination.list_document_ids(path).await?;
        let mut deleted = 0u64;

        let descend = !bounded
            || (config.recursive && (config.max_depth == 0 || depth < config.max_depth));
        if descend {
            for id in &ids {
                let doc_path = format!("{}/{}", path, id);
                for name in self.ctx.destination.list_subcollections(&doc_path).await? {
                    if self.ctx.excludes.matches(&name) {
                        continue;
                    }
                    deleted += self
                        .clear_level(&format!("{}/{}", doc_path, name), depth + 1, bounded)
                        .await?;
                }
            }
        }

        for chunk in ids.chunks(config.batch_size) {
            let batch = WriteBatch {
                ops: chunk
                    .iter()
                    .map(|id| WriteOp::Delete {
                        path: format!("{}/{}", path, id),
                    })
                    .collect(),
            };
            self.commit_deletes(path, batch).await?;
            deleted += chunk.len() as u64;
        }

        Ok(deleted)
    }

    /// Clear the destination collection mapped from a source collection.
    pub async fn clear_destination_collection(&self, collection: &str) -> Result<u64> {
        let dest_root = self.ctx.config.mapped_collection(collection);
        let deleted = self.clear_level(&dest_root, 0, true).await?;
        info!("'{}': cleared {} destination documents", dest_root, deleted);
        Ok(deleted)
    }

    async fn commit_deletes(&self, label: &str, batch: WriteBatch) -> Result<()> {
        let count = batch.len() as u64;
        if count == 0 {
            return Ok(());
        }

        if self.ctx.config.dry_run {
            debug!("{}: dry-run, skipping {} deletes", label, count);
        } else {
            if let Some(limiter) = &self.ctx.limiter {
                limiter.acquire(count as u32).await;
            }
            let destination = Arc::clone(&self.ctx.destination);
            self.ctx
                .retry
                .run(label, || {
                    let destination = Arc::clone(&destination);
                    let batch = batch.clone();
                    async move { destination.commit(batch).await }
                })
                .await?;
        }

        self.ctx.stats.lock().await.documents_deleted += count;
        Ok(())
    }

    /// Count the documents a transfer of `collection` would visit.
    /// Uses the server-side aggregate when no recursion is needed.
    pub async fn count_collection(&self, collection: &str) -> Result<u64> {
        let config = &self.ctx.config;
        if !config.recursive {
            let mut count = self
                .ctx
                .source
                .aggregate_count(collection, &config.filters)
                .await?;
            if let Some(limit) = config.limit {
                count = count.min(limit as u64);
            }
            return Ok(count);
        }
        self.count_level(collection, 0).await
    }

    /// Recursive count fetches id-only projections because document
    /// references are needed to discover sub-collections.
    #[async_recursion]
    async fn count_level(&self, path: &str, depth: u32) -> Result<u64> {
        let config = &self.ctx.config;
        let query = DocumentQuery {
            filters: if depth == 0 { config.filters.clone() } else { Vec::new() },
            limit: if depth == 0 { config.limit } else { None },
            ids_only: true,
        };

        let docs = self.ctx.source.query_documents(path, &query).await?;
        let mut count = docs.len() as u64;

        if config.max_depth == 0 || depth < config.max_depth {
            for doc in &docs {
                for name in self.ctx.source.list_subcollections(&doc.path).await? {
                    if self.ctx.excludes.matches(&name) {
                        continue;
                    }
                    count += self
                        .count_level(&format!("{}/{}", doc.path, name), depth + 1)
                        .await?;
                }
            }
        }

        Ok(count)
    }

    /// Delete destination documents whose ids are absent from the source
    /// collection, recursing into the orphans' own sub-collections to
    /// clear them entirely. The id mapping (prefix/suffix) is applied to
    /// source ids before the comparison.
    pub async fn sync_orphans(&self, collection: &str) -> Result<u64> {
        let config = &self.ctx.config;
        let dest_root = config.mapped_collection(collection);

        let source_ids = self.ctx.source.list_document_ids(collection).await?;
        let expected: std::collections::HashSet<String> =
            source_ids.iter().map(|id| config.mapped_id(id)).collect();

        let dest_ids = self.ctx.destination.list_document_ids(&dest_root).await?;
        let orphans: Vec<String> = dest_ids
            .into_iter()
            .filter(|id| !expected.contains(id))
            .collect();

        if orphans.is_empty() {
            debug!("'{}': no orphaned documents", dest_root);
            return Ok(0);
        }
        info!("'{}': {} orphaned documents to delete", dest_root, orphans.len());

        let mut deleted = 0u64;
        for id in &orphans {
            let doc_path = format!("{}/{}", dest_root, id);
            for name in self.ctx.destination.list_subcollections(&doc_path).await? {
                if self.ctx.excludes.matches(&name) {
                    continue;
                }
                deleted += self
                    .clear_level(&format!("{}/{}", doc_path, name), 1, false)
                    .await?;
            }
        }

        for chunk in orphans.chunks(config.batch_size) {
            let batch = WriteBatch {
                ops: chunk
                    .iter()
                    .map(|id| WriteOp::Delete {
                        path: format!("{}/{}", dest_root, id),
                    })
                    .collect(),
            };
            self.commit_deletes(&dest_root, batch).await?;
            deleted += chunk.len() as u64;
        }

        Ok(deleted)
    }
}

fn format_marker(marker: Option<DateTime<Utc>>) -> String {
    match marker {
        Some(t) => t.to_rfc3339(),
        None => "absent".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn data(pairs: &[(&str, serde_json::Value)]) -> crate::store::DocumentData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn engine_with(
        source: Arc<MemoryStore>,
        destination: Arc<MemoryStore>,
        config: TransferConfig,
    ) -> TransferEngine {
        let ctx = TransferContext::new(source, destination, Arc::new(config)).unwrap();
        TransferEngine::new(ctx)
    }

    fn base_config(collections: &[&str]) -> TransferConfig {
        TransferConfig {
            collections: collections.iter().map(|s| s.to_string()).collect(),
            ..TransferConfig::default()
        }
    }

    #[tokio::test]
    async fn test_batches_of_1250_split_500_500_250() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        for i in 0..1250 {
            source
                .seed("users", &format!("u{:05}", i), data(&[("n", json!(i))]))
                .await;
        }

        let engine = engine_with(source, destination.clone(), base_config(&["users"])).await;
        engine.transfer_collection("users").await.unwrap();

        assert_eq!(destination.commit_sizes().await, vec![500, 500, 250]);
        assert_eq!(destination.collection_len("users").await, 1250);
        assert_eq!(
            engine.context().stats.lock().await.documents_transferred,
            1250
        );
    }

    #[tokio::test]
    async fn test_batch_count_is_ceiling_of_docs_over_batch_size() {
        for (n, batch_size, expected) in [(23usize, 7usize, vec![7, 7, 7, 2]), (6, 2, vec![2, 2, 2]), (1, 500, vec![1])] {
            let source = Arc::new(MemoryStore::new("A"));
            let destination = Arc::new(MemoryStore::new("B"));
            for i in 0..n {
                source
                    .seed("users", &format!("u{:05}", i), data(&[]))
                    .await;
            }

            let mut config = base_config(&["users"]);
            config.batch_size = batch_size;
            let engine = engine_with(source, destination.clone(), config).await;
            engine.transfer_collection("users").await.unwrap();

            assert_eq!(destination.commit_sizes().await, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_paces_batch_commits() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        for i in 0..10 {
            source.seed("users", &format!("u{}", i), data(&[])).await;
        }

        let mut config = base_config(&["users"]);
        config.batch_size = 5;
        config.rate_limit_per_sec = 5;

        let started = tokio::time::Instant::now();
        let engine = engine_with(source, destination.clone(), config).await;
        engine.transfer_collection("users").await.unwrap();

        // Two five-write batches at five writes/second: the second batch
        // waits for the next window.
        assert_eq!(destination.commit_sizes().await, vec![5, 5]);
        assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rename_applies_to_root_segment_only() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "u1", data(&[("n", json!(1))])).await;
        source
            .seed("users/u1/orders", "o1", data(&[("n", json!(2))]))
            .await;

        let mut config = base_config(&["users"]);
        config.recursive = true;
        config
            .rename
            .insert("users".to_string(), "customers".to_string());

        let engine = engine_with(source, destination.clone(), config).await;
        engine.transfer_collection("users").await.unwrap();

        assert!(destination.contains("customers", "u1").await);
        // The inner segment keeps its source name under the renamed root.
        assert!(destination.contains("customers/u1/orders", "o1").await);
    }

    #[tokio::test]
    async fn test_id_affixes_propagate_into_nested_paths() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "u1", data(&[])).await;
        source.seed("users/u1/orders", "o1", data(&[])).await;

        let mut config = base_config(&["users"]);
        config.recursive = true;
        config.id_prefix = Some("eu-".to_string());

        let engine = engine_with(source, destination.clone(), config).await;
        engine.transfer_collection("users").await.unwrap();

        assert!(destination.contains("users", "eu-u1").await);
        assert!(destination.contains("users/eu-u1/orders", "eu-o1").await);
    }

    #[tokio::test]
    async fn test_transform_skip_counts_as_done() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "keep", data(&[("n", json!(1))])).await;
        source.seed("users", "drop", data(&[("internal", json!(true))])).await;

        let mut ctx = TransferContext::new(
            source,
            destination.clone(),
            Arc::new(base_config(&["users"])),
        )
        .unwrap();
        ctx.transform = Some(Arc::new(crate::transform::FnTransform(
            |data: crate::store::DocumentData, _ctx: &TransformContext<'_>| {
                if data.contains_key("internal") {
                    Ok(TransformAction::Skip)
                } else {
                    Ok(TransformAction::Keep(data))
                }
            },
        )));
        let dir = tempfile::tempdir().unwrap();
        let state = crate::checkpoint::CheckpointState::create_initial(
            &base_config(&["users"]),
            "A",
            "B",
        );
        ctx.saver = Some(Arc::new(StateSaver::new(
            dir.path().join("checkpoint.json"),
            state,
            crate::checkpoint::SaverThresholds::default(),
            0,
        )));

        let engine = TransferEngine::new(ctx);
        engine.transfer_collection("users").await.unwrap();

        assert!(destination.contains("users", "keep").await);
        assert!(!destination.contains("users", "drop").await);
        // Both ids are recorded as completed for resume.
        let saver = engine.context().saver.as_ref().unwrap();
        assert!(saver.is_completed("users", "drop").await);
        assert!(saver.is_completed("users", "keep").await);
        assert_eq!(
            engine.context().stats.lock().await.documents_transferred,
            1
        );
    }

    #[tokio::test]
    async fn test_max_depth_limits_recursion() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "u1", data(&[])).await;
        source.seed("users/u1/orders", "o1", data(&[])).await;
        source.seed("users/u1/orders/o1/lines", "l1", data(&[])).await;

        let mut config = base_config(&["users"]);
        config.recursive = true;
        config.max_depth = 1;

        let engine = engine_with(source, destination.clone(), config).await;
        engine.transfer_collection("users").await.unwrap();

        assert!(destination.contains("users/u1/orders", "o1").await);
        assert_eq!(destination.collection_len("users/u1/orders/o1/lines").await, 0);
    }

    #[tokio::test]
    async fn test_excluded_subcollections_are_skipped() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "u1", data(&[])).await;
        source.seed("users/u1/orders", "o1", data(&[])).await;
        source.seed("users/u1/cache_v1", "c1", data(&[])).await;

        let mut config = base_config(&["users"]);
        config.recursive = true;
        config.exclude = vec!["cache*".to_string()];

        let engine = engine_with(source, destination.clone(), config).await;
        engine.transfer_collection("users").await.unwrap();

        assert!(destination.contains("users/u1/orders", "o1").await);
        assert_eq!(destination.collection_len("users/u1/cache_v1").await, 0);
    }

    #[tokio::test]
    async fn test_conflict_recorded_but_write_proceeds() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "u1", data(&[("v", json!("new"))])).await;
        destination.seed("users", "u1", data(&[("v", json!("old"))])).await;

        let mut config = base_config(&["users"]);
        config.detect_conflicts = true;
        // One-document batches so the destination can change between the
        // capture and the commit of a later batch.
        config.batch_size = 1;
        source.seed("users", "u2", data(&[("v", json!("new"))])).await;

        let ctx = TransferContext::new(source, destination.clone(), Arc::new(config)).unwrap();
        let engine = TransferEngine::new(ctx);

        // Simulate a concurrent writer bumping u1 after capture by seeding
        // it again before the transfer reads it a second time: capture and
        // re-check happen within one batch here, so instead verify the
        // lenient path directly with a stale capture.
        let captured = vec![CapturedVersion {
            dest_path: "users/u1".to_string(),
            source_id: "u1".to_string(),
            seen: Some(Utc::now() - chrono::Duration::seconds(60)),
        }];
        engine.record_conflicts("users", &captured).await;

        assert_eq!(engine.context().stats.lock().await.conflicts, 1);
        assert_eq!(engine.context().conflicts.lock().await.len(), 1);

        // The transfer still overwrites the conflicted document.
        engine.transfer_collection("users").await.unwrap();
        assert_eq!(
            destination.document_data("users/u1").await.unwrap()["v"],
            json!("new")
        );
    }

    #[tokio::test]
    async fn test_dry_run_commits_nothing_but_counts_everything() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        for i in 0..7 {
            source.seed("users", &format!("u{}", i), data(&[])).await;
        }

        let mut config = base_config(&["users"]);
        config.dry_run = true;

        let engine = engine_with(source, destination.clone(), config).await;
        engine.transfer_collection("users").await.unwrap();

        assert!(destination.commit_sizes().await.is_empty());
        assert_eq!(destination.collection_len("users").await, 0);
        assert_eq!(engine.context().stats.lock().await.documents_transferred, 7);
    }

    #[tokio::test]
    async fn test_clear_is_depth_first() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        destination.seed("users", "u1", data(&[])).await;
        destination.seed("users/u1/orders", "o1", data(&[])).await;

        let mut config = base_config(&["users"]);
        config.recursive = true;

        let engine = engine_with(source, destination.clone(), config).await;
        let deleted = engine.clear_destination_collection("users").await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(destination.collection_len("users").await, 0);
        assert_eq!(destination.collection_len("users/u1/orders").await, 0);
        // Sub-collection batch committed before the parent's documents.
        assert_eq!(destination.commit_sizes().await, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_count_uses_aggregate_without_recursion() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        for i in 0..9 {
            source.seed("users", &format!("u{}", i), data(&[])).await;
        }
        source.seed("users/u1/orders", "o1", data(&[])).await;

        let mut config = base_config(&["users"]);
        config.limit = Some(5);
        let engine = engine_with(source.clone(), destination.clone(), config).await;
        assert_eq!(engine.count_collection("users").await.unwrap(), 5);

        let mut config = base_config(&["users"]);
        config.recursive = true;
        let engine = engine_with(source, destination, config).await;
        assert_eq!(engine.count_collection("users").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_orphan_sync_respects_id_mapping() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        source.seed("users", "u1", data(&[])).await;
        destination.seed("users", "eu-u1", data(&[])).await;
        destination.seed("users", "eu-gone", data(&[])).await;
        destination.seed("users/eu-gone/orders", "o1", data(&[])).await;

        let mut config = base_config(&["users"]);
        config.id_prefix = Some("eu-".to_string());

        let engine = engine_with(source, destination.clone(), config).await;
        let deleted = engine.sync_orphans("users").await.unwrap();

        // The orphan and its sub-collection subtree are removed; the
        // mapped survivor stays.
        assert_eq!(deleted, 2);
        assert!(destination.contains("users", "eu-u1").await);
        assert!(!destination.contains("users", "eu-gone").await);
        assert_eq!(destination.collection_len("users/eu-gone/orders").await, 0);
    }

    #[tokio::test]
    async fn test_resume_skips_checkpointed_documents() {
        let source = Arc::new(MemoryStore::new("A"));
        let destination = Arc::new(MemoryStore::new("B"));
        for id in ["doc1", "doc2", "doc3"] {
            source.seed("users", id, data(&[("id", json!(id))])).await;
        }

        let dir = tempfile::tempdir().unwrap();
        let config = base_config(&["users"]);
        let mut state =
            crate::checkpoint::CheckpointState::create_initial(&config, "A", "B");
        state
            .completed_docs
            .insert("users".into(), vec!["doc1".into(), "doc2".into()]);

        let mut ctx =
            TransferContext::new(source, destination.clone(), Arc::new(config)).unwrap();
        let saver = Arc::new(StateSaver::new(
            dir.path().join("checkpoint.json"),
            state,
            crate::checkpoint::SaverThresholds::default(),
            0,
        ));
        ctx.saver = Some(saver.clone());

        let engine = TransferEngine::new(ctx);
        engine.transfer_collection("users").await.unwrap();

        // Only doc3 was written; after flush the checkpoint holds all three.
        assert_eq!(destination.collection_len("users").await, 1);
        assert!(destination.contains("users", "doc3").await);
        saver.flush().await.unwrap();
        assert_eq!(saver.completed_count().await, 3);
        let loaded = crate::checkpoint::load(&dir.path().join("checkpoint.json")).unwrap();
        assert_eq!(loaded.completed_docs["users"], vec!["doc1", "doc2", "doc3"]);
    }
}
