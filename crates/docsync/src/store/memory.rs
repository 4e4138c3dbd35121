//! In-memory store backend for tests and demos.

use super::{
    parent_collection, Document, DocumentData, DocumentQuery, DocumentStore, FieldFilter,
    WriteBatch, WriteOp,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Clone)]
struct StoredDoc {
    data: DocumentData,
    update_time: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    /// Collection path → documents in id order.
    collections: HashMap<String, BTreeMap<String, StoredDoc>>,
    /// Sizes of committed non-empty batches, in commit order.
    commit_log: Vec<usize>,
}

/// A hierarchical document store held entirely in memory.
///
/// Records the size of every committed batch so tests can assert on
/// batching behavior.
pub struct MemoryStore {
    identity: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert or overwrite a document, bumping its version marker.
    pub async fn seed(&self, collection_path: &str, id: &str, data: DocumentData) {
        let mut inner = self.inner.lock().await;
        Self::put(&mut inner, collection_path, id, data, false);
    }

    /// Sizes of all committed batches so far.
    pub async fn commit_sizes(&self) -> Vec<usize> {
        self.inner.lock().await.commit_log.clone()
    }

    /// Field data of a document, if present.
    pub async fn document_data(&self, document_path: &str) -> Option<DocumentData> {
        let inner = self.inner.lock().await;
        let collection = parent_collection(document_path);
        let id = super::document_id(document_path);
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|d| d.data.clone())
    }

    pub async fn contains(&self, collection_path: &str, id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(collection_path)
            .is_some_and(|docs| docs.contains_key(id))
    }

    pub async fn collection_len(&self, collection_path: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(collection_path)
            .map_or(0, |docs| docs.len())
    }

    fn put(inner: &mut Inner, collection_path: &str, id: &str, data: DocumentData, merge: bool) {
        let docs = inner.collections.entry(collection_path.to_string()).or_default();
        let now = Utc::now();
        match docs.get_mut(id) {
            Some(existing) => {
                if merge {
                    for (k, v) in data {
                        existing.data.insert(k, v);
                    }
                } else {
                    existing.data = data;
                }
                // Version markers are strictly monotonic per document.
                existing.update_time = if now > existing.update_time {
                    now
                } else {
                    existing.update_time + Duration::nanoseconds(1)
                };
            }
            None => {
                docs.insert(
                    id.to_string(),
                    StoredDoc {
                        data,
                        update_time: now,
                    },
                );
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn list_root_collections(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner
            .collections
            .iter()
            .filter(|(path, docs)| !path.contains('/') && !docs.is_empty())
            .map(|(path, _)| path.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let prefix = format!("{}/", document_path);
        let mut names: Vec<String> = inner
            .collections
            .iter()
            .filter_map(|(path, docs)| {
                let rest = path.strip_prefix(&prefix)?;
                (!rest.contains('/') && !docs.is_empty()).then(|| rest.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn query_documents(
        &self,
        collection_path: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<Document>> {
        let inner = self.inner.lock().await;
        let Some(docs) = inner.collections.get(collection_path) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for (id, doc) in docs {
            if !query.filters.iter().all(|f| f.matches(&doc.data)) {
                continue;
            }
            out.push(Document {
                id: id.clone(),
                path: format!("{}/{}", collection_path, id),
                data: if query.ids_only {
                    DocumentData::new()
                } else {
                    doc.data.clone()
                },
                update_time: Some(doc.update_time),
            });
            if query.limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
        }
        Ok(out)
    }

    async fn list_document_ids(&self, collection_path: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .collections
            .get(collection_path)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn aggregate_count(
        &self,
        collection_path: &str,
        filters: &[FieldFilter],
    ) -> Result<u64> {
        let inner = self.inner.lock().await;
        let Some(docs) = inner.collections.get(collection_path) else {
            return Ok(0);
        };
        Ok(docs
            .values()
            .filter(|doc| filters.iter().all(|f| f.matches(&doc.data)))
            .count() as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        inner.commit_log.push(batch.len());
        for op in batch.ops {
            match op {
                WriteOp::Upsert { path, data, merge } => {
                    let collection = parent_collection(&path).to_string();
                    let id = super::document_id(&path).to_string();
                    Self::put(&mut inner, &collection, &id, data, merge);
                }
                WriteOp::Delete { path } => {
                    let collection = parent_collection(&path);
                    let id = super::document_id(&path);
                    // Deleting an absent document is not an error.
                    if let Some(docs) = inner.collections.get_mut(collection) {
                        docs.remove(id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn update_time(&self, document_path: &str) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;
        let collection = parent_collection(document_path);
        let id = super::document_id(document_path);
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|d| d.update_time))
    }
}
