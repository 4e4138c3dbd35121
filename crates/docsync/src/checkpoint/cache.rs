//! In-memory set of already-transferred document ids.
//!
//! Pure acceleration structure: one set per collection path, lazily
//! created, O(1) membership. Durability comes from the checkpoint file.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct CompletedDocsCache {
    sets: HashMap<String, HashSet<String>>,
}

impl CompletedDocsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the cache from the array-per-collection checkpoint form.
    pub fn from_record(record: &HashMap<String, Vec<String>>) -> Self {
        let sets = record
            .iter()
            .map(|(collection, ids)| (collection.clone(), ids.iter().cloned().collect()))
            .collect();
        Self { sets }
    }

    /// O(1) membership test.
    pub fn has(&self, collection: &str, id: &str) -> bool {
        self.sets
            .get(collection)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Record one completed document. Adding a duplicate is a no-op.
    pub fn add(&mut self, collection: &str, id: impl Into<String>) {
        self.sets
            .entry(collection.to_string())
            .or_default()
            .insert(id.into());
    }

    /// Bulk insert: one map lookup for the whole batch.
    pub fn add_batch<I>(&mut self, collection: &str, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.sets
            .entry(collection.to_string())
            .or_default()
            .extend(ids);
    }

    /// Sum of all set sizes.
    pub fn total_count(&self) -> usize {
        self.sets.values().map(|ids| ids.len()).sum()
    }

    /// Serialize back to the checkpoint form, ids sorted for a
    /// deterministic file.
    pub fn to_record(&self) -> HashMap<String, Vec<String>> {
        self.sets
            .iter()
            .map(|(collection, ids)| {
                let mut ids: Vec<String> = ids.iter().cloned().collect();
                ids.sort();
                (collection.clone(), ids)
            })
            .collect()
    }
}
