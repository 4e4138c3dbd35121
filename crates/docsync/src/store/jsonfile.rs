//! JSON-file store backend.
//!
//! Holds an entire store image in one JSON file: collection path →
//! document id → `{data, update_time}`. Good for local snapshots and for
//! exercising the engine end-to-end without a remote service.

use super::{
    parent_collection, Document, DocumentData, DocumentQuery, DocumentStore, FieldFilter,
    WriteBatch, WriteOp,
};
use crate::error::Result;
use crate::fsutil::write_json_atomic;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
    #[serde(default)]
    data: DocumentData,
    update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileImage {
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    collections: HashMap<String, BTreeMap<String, StoredDoc>>,
}

/// A document store persisted as a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    identity: String,
    image: Mutex<FileImage>,
}

impl JsonFileStore {
    /// Open (or create) a file-backed store. An absent file is an empty
    /// store; the file is only written on the first commit.
    pub async fn open(path: PathBuf, identity: Option<String>) -> Result<Self> {
        let image = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileImage::default(),
            Err(e) => return Err(e.into()),
        };

        let identity = identity
            .or_else(|| image.identity.clone())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path,
            identity,
            image: Mutex::new(image),
        })
    }

    fn persist(&self, image: &mut FileImage) -> Result<()> {
        image.identity = Some(self.identity.clone());
        write_json_atomic(&self.path, image)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn list_root_collections(&self) -> Result<Vec<String>> {
        let image = self.image.lock().await;
        let mut names: Vec<String> = image
            .collections
            .iter()
            .filter(|(path, docs)| !path.contains('/') && !docs.is_empty())
            .map(|(path, _)| path.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>> {
        let image = self.image.lock().await;
        let prefix = format!("{}/", document_path);
        let mut names: Vec<String> = image
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
        let image = self.image.lock().await;
        let Some(docs) = image.collections.get(collection_path) else {
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
                update_time: doc.update_time,
            });
            if query.limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
        }
        Ok(out)
    }

    async fn list_document_ids(&self, collection_path: &str) -> Result<Vec<String>> {
        let image = self.image.lock().await;
        Ok(image
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
        let image = self.image.lock().await;
        let Some(docs) = image.collections.get(collection_path) else {
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
        let mut image = self.image.lock().await;
        for op in batch.ops {
            match op {
                WriteOp::Upsert { path, data, merge } => {
                    let collection = parent_collection(&path).to_string();
                    let id = super::document_id(&path).to_string();
                    let docs = image.collections.entry(collection).or_default();
                    let entry = docs.entry(id).or_insert_with(|| StoredDoc {
                        data: DocumentData::new(),
                        update_time: None,
                    });
                    if merge {
                        for (k, v) in data {
                            entry.data.insert(k, v);
                        }
                    } else {
                        entry.data = data;
                    }
                    entry.update_time = Some(Utc::now());
                }
                WriteOp::Delete { path } => {
                    let collection = parent_collection(&path);
                    let id = super::document_id(&path);
                    if let Some(docs) = image.collections.get_mut(collection) {
                        docs.remove(id);
                    }
                }
            }
        }
        self.persist(&mut image)
    }

    async fn update_time(&self, document_path: &str) -> Result<Option<DateTime<Utc>>> {
        let image = self.image.lock().await;
        let collection = parent_collection(document_path);
        let id = super::document_id(document_path);
        Ok(image
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .and_then(|d| d.update_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, serde_json::Value)]) -> DocumentData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_commits_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(path.clone(), Some("projects/alpha".into()))
            .await
            .unwrap();
        let batch = WriteBatch {
            ops: vec![WriteOp::Upsert {
                path: "users/u1".into(),
                data: doc(&[("name", json!("Ada"))]),
                merge: false,
            }],
        };
        store.commit(batch).await.unwrap();

        let reopened = JsonFileStore::open(path, None).await.unwrap();
        assert_eq!(reopened.identity(), "projects/alpha");
        let docs = reopened
            .query_documents("users", &DocumentQuery::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].data["name"], json!("Ada"));
        assert!(docs[0].update_time.is_some());
    }

    #[tokio::test]
    async fn test_absent_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("missing.json"), None)
            .await
            .unwrap();
        assert!(store.list_root_collections().await.unwrap().is_empty());
    }
}
