//! Query Registry (C9): holds in-flight [`Query`] state, keyed by id.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{EngineError, Result};
use crate::types::{GuideImage, Query};

/// A concurrent registry of transient queries.
///
/// Entries are not persisted; once the process restarts, outstanding
/// queries and their caches are gone, the same as the teacher's in-memory
/// session caches.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    queries: DashMap<u64, Query>,
    next_id: AtomicU64,
}

impl QueryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queries: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registers a new query for `text`, returning its assigned id.
    pub fn create(&self, text: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.queries.insert(id, Query::new(id, text));
        id
    }

    /// Retrieves a clone of the query's current state.
    pub fn get(&self, id: u64) -> Result<Query> {
        self.queries
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(EngineError::NotFound(format!("no query with id {id}")))
    }

    /// Attaches guide images to a query, but only if none are attached yet.
    /// Subsequent calls are no-ops, matching the "generated at most once"
    /// guarantee the retrieval pipeline relies on for caching.
    pub fn attach_guide_images_if_absent(&self, id: u64, images: Vec<GuideImage>) -> Result<()> {
        let mut entry = self
            .queries
            .get_mut(&id)
            .ok_or(EngineError::NotFound(format!("no query with id {id}")))?;
        if entry.guide_images.is_none() {
            entry.guide_images = Some(images);
        }
        Ok(())
    }

    /// Records the per-embedder top list for a query.
    pub fn set_embedder_results(&self, id: u64, results: BTreeMap<String, Vec<String>>) -> Result<()> {
        let mut entry = self
            .queries
            .get_mut(&id)
            .ok_or(EngineError::NotFound(format!("no query with id {id}")))?;
        entry.embedder_results = results;
        Ok(())
    }

    /// Records the final fused ranking for a query.
    pub fn set_final_results(&self, id: u64, results: Vec<String>) -> Result<()> {
        let mut entry = self
            .queries
            .get_mut(&id)
            .ok_or(EngineError::NotFound(format!("no query with id {id}")))?;
        entry.final_results = Some(results);
        Ok(())
    }

    /// Lists every live query id.
    #[must_use]
    pub fn list_ids(&self) -> Vec<u64> {
        self.queries.iter().map(|e| *e.key()).collect()
    }

    /// Drops a query's state.
    pub fn remove(&self, id: u64) {
        self.queries.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_fetch() {
        let registry = QueryRegistry::new();
        let id = registry.create("a cat on a skateboard");
        let query = registry.get(id).unwrap();
        assert_eq!(query.text, "a cat on a skateboard");
        assert!(query.guide_images.is_none());
    }

    #[test]
    fn guide_images_attach_only_once() {
        let registry = QueryRegistry::new();
        let id = registry.create("query");

        let first = GuideImage {
            bytes: vec![1, 2, 3],
            engine_name: "engine-a".into(),
        };
        let second = GuideImage {
            bytes: vec![4, 5, 6],
            engine_name: "engine-b".into(),
        };

        registry.attach_guide_images_if_absent(id, vec![first.clone()]).unwrap();
        registry.attach_guide_images_if_absent(id, vec![second]).unwrap();

        let query = registry.get(id).unwrap();
        assert_eq!(query.guide_images.unwrap(), vec![first]);
    }

    #[test]
    fn unknown_query_is_not_found() {
        let registry = QueryRegistry::new();
        assert!(matches!(registry.get(999), Err(EngineError::NotFound(_))));
    }
}
