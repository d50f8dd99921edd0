//! [`VectorStoreSet`]: one [`HnswCollection`] per embedder name.

use dashmap::DashMap;

use crate::config::IndexParams;
use crate::error::{EngineError, Result};
use crate::types::VectorEntry;

use super::{HnswCollection, VectorCollection, VectorFilter};

/// Owns one vector collection per configured embedder, keyed by embedder
/// name, and routes writes and searches to the matching collection.
#[derive(Debug, Default)]
pub struct VectorStoreSet {
    collections: DashMap<String, HnswCollection>,
}

impl VectorStoreSet {
    /// Creates an empty set; collections are added with
    /// [`VectorStoreSet::create_if_absent`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    /// Ensures a collection exists for `embedder_name`, creating one with
    /// `dimension` and `params` if absent. A no-op if the collection already
    /// exists, regardless of the dimension passed.
    pub fn create_if_absent(&self, embedder_name: &str, dimension: usize, params: IndexParams) {
        self.collections
            .entry(embedder_name.to_string())
            .or_insert_with(|| HnswCollection::new(dimension, params));
    }

    /// Inserts or replaces an entry in the named embedder's collection.
    pub async fn upsert(&self, embedder_name: &str, entry: VectorEntry) -> Result<()> {
        let collection = self.collection(embedder_name)?;
        collection.upsert(entry).await
    }

    /// Inserts or replaces a batch of entries in the named embedder's
    /// collection in one call, used by directory indexing so one forward
    /// pass's output reaches the index as a single write.
    pub async fn insert(&self, embedder_name: &str, entries: Vec<VectorEntry>) -> Result<()> {
        let collection = self.collection(embedder_name)?;
        collection.insert(entries).await
    }

    /// Removes an entry from every embedder's collection.
    pub async fn remove_everywhere(&self, image_path: &str) -> Result<()> {
        for collection in &self.collections {
            collection.remove(image_path).await?;
        }
        Ok(())
    }

    /// Moves every collection's entry at `old_path` to `new_path`, keeping
    /// its stored embedding instead of re-embedding after a filesystem
    /// rename. A collection with no entry at `old_path` is left untouched.
    pub async fn rename_everywhere(&self, old_path: &str, new_path: &str) -> Result<()> {
        let key = [old_path.to_string()];
        for collection in &self.collections {
            let mut entries = collection.iterate(VectorFilter::Paths(&key), 1).await?;
            if entries.is_empty() {
                continue;
            }
            for entry in &mut entries {
                entry.image_path = new_path.to_string();
            }
            collection.insert(entries).await?;
            collection.remove(old_path).await?;
        }
        Ok(())
    }

    /// Returns every entry matching `filter` in the named embedder's
    /// collection.
    pub async fn iterate(
        &self,
        embedder_name: &str,
        filter: VectorFilter<'_>,
        batch_size: usize,
    ) -> Result<Vec<VectorEntry>> {
        let collection = self.collection(embedder_name)?;
        collection.iterate(filter, batch_size).await
    }

    /// Searches the named embedder's collection for the `k` nearest
    /// neighbors of `query`, restricted to `allowed_directories` when
    /// non-empty.
    pub async fn search(
        &self,
        embedder_name: &str,
        query: &[f32],
        k: usize,
        allowed_directories: &[i64],
    ) -> Result<Vec<(String, f32)>> {
        let collection = self.collection(embedder_name)?;
        collection.search(query, k, allowed_directories).await
    }

    /// Snapshots the named embedder's collection, for persistence.
    pub fn snapshot(&self, embedder_name: &str) -> Result<Vec<VectorEntry>> {
        Ok(self.collection(embedder_name)?.snapshot())
    }

    /// Loads a persisted snapshot into the named embedder's collection,
    /// creating it first if absent.
    pub fn load(
        &self,
        embedder_name: &str,
        dimension: usize,
        params: IndexParams,
        entries: Vec<VectorEntry>,
    ) -> Result<()> {
        self.create_if_absent(embedder_name, dimension, params);
        self.collection(embedder_name)?.load(entries)
    }

    /// Names of every embedder with a registered collection.
    #[must_use]
    pub fn embedder_names(&self) -> Vec<String> {
        self.collections.iter().map(|e| e.key().clone()).collect()
    }

    fn collection(
        &self,
        embedder_name: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, HnswCollection>> {
        self.collections
            .get(embedder_name)
            .ok_or_else(|| EngineError::NotFound(format!("no vector collection for embedder '{embedder_name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, directory_id: i64, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            directory_id,
            image_path: path.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn create_and_upsert() {
        let set = VectorStoreSet::new();
        set.create_if_absent("clip", 4, IndexParams::default());
        set.upsert("clip", entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        let results = set.search("clip", &[1.0, 0.0, 0.0, 0.0], 1, &[]).await.unwrap();
        assert_eq!(results[0].0, "a.png");
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let set = VectorStoreSet::new();
        let result = set.search("missing", &[1.0], 1, &[]).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn insert_batches_into_one_collection() {
        let set = VectorStoreSet::new();
        set.create_if_absent("clip", 4, IndexParams::default());
        set.insert(
            "clip",
            vec![
                entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]),
                entry("b.png", 1, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await
        .unwrap();

        let results = set.search("clip", &[1.0, 0.0, 0.0, 0.0], 2, &[]).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn rename_everywhere_preserves_the_embedding() {
        let set = VectorStoreSet::new();
        set.create_if_absent("clip", 4, IndexParams::default());
        set.upsert("clip", entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        set.rename_everywhere("a.png", "renamed.png").await.unwrap();

        let entries = set.iterate("clip", VectorFilter::All, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].image_path, "renamed.png");
        assert_eq!(entries[0].embedding, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn remove_everywhere_clears_all_collections() {
        let set = VectorStoreSet::new();
        set.create_if_absent("clip", 4, IndexParams::default());
        set.create_if_absent("dino", 4, IndexParams::default());
        set.upsert("clip", entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        set.upsert("dino", entry("a.png", 1, vec![0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        set.remove_everywhere("a.png").await.unwrap();
        assert_eq!(set.search("clip", &[1.0, 0.0, 0.0, 0.0], 1, &[]).await.unwrap().len(), 0);
        assert_eq!(set.search("dino", &[1.0, 0.0, 0.0, 0.0], 1, &[]).await.unwrap().len(), 0);
    }
}
