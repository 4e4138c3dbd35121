//! Document store abstraction.
//!
//! The transfer engine never talks to a concrete backend; it works with
//! `Arc<dyn DocumentStore>` and the small data types in this module. Two
//! backends ship with the crate: [`MemoryStore`] for tests and demos, and
//! [`JsonFileStore`] for local snapshots. Real network clients implement
//! the same trait.

mod jsonfile;
mod memory;

pub use jsonfile::JsonFileStore;
pub use memory::MemoryStore;

use crate::config::StoreEndpoint;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Document payloads are JSON objects.
pub type DocumentData = serde_json::Map<String, Value>;

/// A document read from a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Leaf document id.
    pub id: String,

    /// Full path, e.g. `users/u1` or `users/u1/orders/o7`.
    pub path: String,

    /// Field data. Empty for id-only projections.
    #[serde(default)]
    pub data: DocumentData,

    /// Server-maintained version marker; changes on every modification.
    pub update_time: Option<DateTime<Utc>>,
}

/// Comparison operator for query filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

/// One equality/inequality/range filter on a document field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    /// Evaluate the filter against document data. A missing field never
    /// matches; incomparable types only match `!=`.
    pub fn matches(&self, data: &DocumentData) -> bool {
        let Some(actual) = data.get(&self.field) else {
            return false;
        };
        match compare_values(actual, &self.value) {
            Some(ord) => match self.op {
                FilterOp::Eq => ord == Ordering::Equal,
                FilterOp::Ne => ord != Ordering::Equal,
                FilterOp::Lt => ord == Ordering::Less,
                FilterOp::Le => ord != Ordering::Greater,
                FilterOp::Gt => ord == Ordering::Greater,
                FilterOp::Ge => ord != Ordering::Less,
            },
            None => self.op == FilterOp::Ne,
        }
    }
}

/// Total order over comparable JSON scalars; `None` for mixed or
/// non-scalar types.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64()?, y.as_f64()?);
            x.partial_cmp(&y)
        }
        _ => None,
    }
}

/// Parameters for reading a page of documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Field filters, all of which must match.
    pub filters: Vec<FieldFilter>,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Return id/path/update_time only, with empty data.
    pub ids_only: bool,
}

/// One staged write. Upserts by id are idempotent; deleting an absent
/// document must not error.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Upsert {
        path: String,
        data: DocumentData,
        merge: bool,
    },
    Delete {
        path: String,
    },
}

impl WriteOp {
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Upsert { path, .. } => path,
            WriteOp::Delete { path } => path,
        }
    }
}

/// A batch of writes committed atomically by the store.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }
}

/// Client interface to one instance of a hierarchical document store.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// concurrent collection transfers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stable identity of this store instance (e.g. project/database id),
    /// recorded in checkpoints and compared on resume.
    fn identity(&self) -> &str;

    /// Names of the root collections.
    async fn list_root_collections(&self) -> Result<Vec<String>>;

    /// Names of the sub-collections nested under a document.
    async fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>>;

    /// Read documents from a collection, in stable id order.
    async fn query_documents(
        &self,
        collection_path: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<Document>>;

    /// All document ids in a collection.
    async fn list_document_ids(&self, collection_path: &str) -> Result<Vec<String>>;

    /// Server-side count of documents matching the filters.
    async fn aggregate_count(&self, collection_path: &str, filters: &[FieldFilter])
        -> Result<u64>;

    /// Commit a batch of writes atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Current version marker of a document, `None` when absent.
    async fn update_time(&self, document_path: &str) -> Result<Option<DateTime<Utc>>>;

    /// Release any held resources. Best-effort; called once at end of run.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Collection path of a document path (`users/u1` → `users`).
pub fn parent_collection(document_path: &str) -> &str {
    match document_path.rfind('/') {
        Some(idx) => &document_path[..idx],
        None => document_path,
    }
}

/// Leaf id of a document path (`users/u1` → `u1`).
pub fn document_id(document_path: &str) -> &str {
    match document_path.rfind('/') {
        Some(idx) => &document_path[idx + 1..],
        None => document_path,
    }
}

/// Open a store backend from a configured endpoint.
pub async fn open_store(endpoint: &StoreEndpoint) -> Result<Arc<dyn DocumentStore>> {
    match endpoint.kind.as_str() {
        "memory" => {
            let identity = endpoint.id.clone().unwrap_or_else(|| "memory".to_string());
            Ok(Arc::new(MemoryStore::new(identity)))
        }
        "file" => {
            let path = endpoint.path.clone().ok_or_else(|| {
                SyncError::Config("file store endpoint requires a path".to_string())
            })?;
            let store = JsonFileStore::open(path, endpoint.id.clone()).await?;
            Ok(Arc::new(store))
        }
        other => Err(SyncError::Config(format!(
            "unknown store type '{}' (expected 'file' or 'memory')",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> DocumentData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_collection("users/u1"), "users");
        assert_eq!(parent_collection("users/u1/orders/o7"), "users/u1/orders");
        assert_eq!(document_id("users/u1/orders/o7"), "o7");
    }

    #[test]
    fn test_filter_equality() {
        let filter = FieldFilter {
            field: "status".into(),
            op: FilterOp::Eq,
            value: json!("active"),
        };
        assert!(filter.matches(&data(&[("status", json!("active"))])));
        assert!(!filter.matches(&data(&[("status", json!("archived"))])));
        assert!(!filter.matches(&data(&[("other", json!("active"))])));
    }

    #[test]
    fn test_filter_range_on_numbers() {
        let filter = FieldFilter {
            field: "age".into(),
            op: FilterOp::Ge,
            value: json!(21),
        };
        assert!(filter.matches(&data(&[("age", json!(21))])));
        assert!(filter.matches(&data(&[("age", json!(34.5))])));
        assert!(!filter.matches(&data(&[("age", json!(20))])));
    }

    #[test]
    fn test_filter_mixed_types_only_match_ne() {
        let filter = FieldFilter {
            field: "age".into(),
            op: FilterOp::Ne,
            value: json!(21),
        };
        assert!(filter.matches(&data(&[("age", json!("twenty-one"))])));

        let eq = FieldFilter {
            field: "age".into(),
            op: FilterOp::Eq,
            value: json!(21),
        };
        assert!(!eq.matches(&data(&[("age", json!("twenty-one"))])));
    }

    #[test]
    fn test_filter_op_serde_names() {
        let filter: FieldFilter =
            serde_json::from_value(json!({"field": "n", "op": ">=", "value": 3})).unwrap();
        assert_eq!(filter.op, FilterOp::Ge);
    }
}
