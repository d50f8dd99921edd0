//! HNSW-backed [`VectorCollection`] for a single embedder.

use std::collections::HashMap;

use instant_distance::{Builder, HnswMap, Point, Search};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;

use crate::config::IndexParams;
use crate::error::{EngineError, Result};
use crate::types::VectorEntry;

use super::{VectorCollection, VectorFilter};

#[derive(Clone, Debug)]
struct EmbeddingPoint {
    embedding: Vec<f32>,
}

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - cosine_similarity(&self.embedding, &other.embedding)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (lhs, rhs) in a.iter().zip(b) {
        dot += lhs * rhs;
        norm_a += lhs * lhs;
        norm_b += rhs * rhs;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct CollectionState {
    entries: Vec<VectorEntry>,
    path_to_index: HashMap<String, usize>,
    hnsw: Option<HnswMap<EmbeddingPoint, usize>>,
    dirty: bool,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            path_to_index: HashMap::new(),
            hnsw: None,
            dirty: false,
        }
    }

    fn rebuild(&mut self) {
        if self.entries.is_empty() {
            self.hnsw = None;
            self.dirty = false;
            return;
        }

        let points: Vec<EmbeddingPoint> = self
            .entries
            .iter()
            .map(|e| EmbeddingPoint {
                embedding: e.embedding.clone(),
            })
            .collect();
        let indices: Vec<usize> = (0..self.entries.len()).collect();

        self.hnsw = Some(Builder::default().build(points, indices));
        self.dirty = false;
    }
}

/// A per-embedder HNSW vector collection.
///
/// Modifications mark the underlying graph dirty; it is rebuilt lazily on
/// the next search, matching instant-distance's immutable-graph design.
pub struct HnswCollection {
    dimension: usize,
    params: IndexParams,
    state: RwLock<CollectionState>,
}

impl std::fmt::Debug for HnswCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("HnswCollection")
            .field("dimension", &self.dimension)
            .field("len", &state.entries.len())
            .finish()
    }
}

impl HnswCollection {
    /// Creates an empty collection for embeddings of the given dimension.
    #[must_use]
    pub fn new(dimension: usize, params: IndexParams) -> Self {
        Self {
            dimension,
            params,
            state: RwLock::new(CollectionState::new()),
        }
    }

    /// Construction parameters this collection was built with.
    #[must_use]
    pub const fn params(&self) -> IndexParams {
        self.params
    }

    /// Replaces the collection's contents wholesale, used when loading a
    /// persisted snapshot.
    pub fn load(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let mut state = self.state.write();
        state.entries.clear();
        state.path_to_index.clear();

        for (idx, entry) in entries.into_iter().enumerate() {
            if entry.embedding.len() != self.dimension {
                return Err(EngineError::VectorStore(anyhow::anyhow!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    entry.embedding.len()
                )));
            }
            state.path_to_index.insert(entry.image_path.clone(), idx);
            state.entries.push(entry);
        }
        state.dirty = true;
        Ok(())
    }

    /// Returns a snapshot of every entry, used for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VectorEntry> {
        self.state.read().entries.clone()
    }
}

impl VectorCollection for HnswCollection {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        self.insert(vec![entry]).await
    }

    async fn insert(&self, entries: Vec<VectorEntry>) -> Result<()> {
        for entry in &entries {
            if entry.embedding.len() != self.dimension {
                return Err(EngineError::VectorStore(anyhow::anyhow!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    entry.embedding.len()
                )));
            }
        }

        let mut state = self.state.write();
        for entry in entries {
            if let Some(&idx) = state.path_to_index.get(&entry.image_path) {
                state.entries[idx] = entry;
            } else {
                let idx = state.entries.len();
                state.path_to_index.insert(entry.image_path.clone(), idx);
                state.entries.push(entry);
            }
        }
        state.dirty = true;
        Ok(())
    }

    async fn remove(&self, image_path: &str) -> Result<()> {
        let mut state = self.state.write();
        let Some(idx) = state.path_to_index.remove(image_path) else {
            return Ok(());
        };

        let removed = state.entries.swap_remove(idx);
        debug_assert_eq!(removed.image_path, image_path);

        if idx < state.entries.len() {
            let swapped_path = state.entries[idx].image_path.clone();
            state.path_to_index.insert(swapped_path, idx);
        }
        state.dirty = true;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        allowed_directories: &[i64],
    ) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimension {
            return Err(EngineError::VectorStore(anyhow::anyhow!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut state = self.state.write();
        if state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if state.dirty || state.hnsw.is_none() {
            state.rebuild();
        }

        let Some(ref hnsw) = state.hnsw else {
            return Ok(Vec::new());
        };

        let query_point = EmbeddingPoint {
            embedding: query.to_vec(),
        };
        let mut search = Search::default();
        let mut results = Vec::new();

        // instant-distance doesn't support metadata filters natively, so an
        // over-fetch-then-filter strategy is used when directories restrict
        // the candidate set.
        let fetch = if allowed_directories.is_empty() {
            k
        } else {
            (k * 8).max(k)
        };

        for candidate in hnsw.search(&query_point, &mut search).take(fetch) {
            let idx = *candidate.value;
            let entry = &state.entries[idx];
            if !allowed_directories.is_empty() && !allowed_directories.contains(&entry.directory_id)
            {
                continue;
            }
            results.push((entry.image_path.clone(), 1.0 - candidate.distance));
            if results.len() == k {
                break;
            }
        }

        results.sort_by_key(|(_, score)| std::cmp::Reverse(OrderedFloat(*score)));
        Ok(results)
    }

    async fn iterate(&self, filter: VectorFilter<'_>, batch_size: usize) -> Result<Vec<VectorEntry>> {
        let _ = batch_size;
        let state = self.state.read();
        Ok(state
            .entries
            .iter()
            .filter(|entry| match filter {
                VectorFilter::All => true,
                VectorFilter::Paths(paths) => paths.iter().any(|path| path == &entry.image_path),
                VectorFilter::Directories(ids) => ids.contains(&entry.directory_id),
            })
            .cloned()
            .collect())
    }

    fn len(&self) -> usize {
        self.state.read().entries.len()
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
    async fn insert_and_search() {
        let collection = HnswCollection::new(4, IndexParams::default());
        collection
            .upsert(entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        collection
            .upsert(entry("b.png", 1, vec![0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(collection.len(), 2);
        let results = collection.search(&[1.0, 0.0, 0.0, 0.0], 1, &[]).await.unwrap();
        assert_eq!(results[0].0, "a.png");
    }

    #[tokio::test]
    async fn search_filters_by_directory() {
        let collection = HnswCollection::new(4, IndexParams::default());
        collection
            .upsert(entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        collection
            .upsert(entry("b.png", 2, vec![0.99, 0.01, 0.0, 0.0]))
            .await
            .unwrap();

        let results = collection
            .search(&[1.0, 0.0, 0.0, 0.0], 5, &[2])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b.png");
    }

    #[tokio::test]
    async fn remove_entry() {
        let collection = HnswCollection::new(4, IndexParams::default());
        collection
            .upsert(entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        collection.remove("a.png").await.unwrap();
        assert_eq!(collection.len(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let collection = HnswCollection::new(4, IndexParams::default());
        let result = collection.upsert(entry("a.png", 1, vec![1.0, 0.0])).await;
        assert!(matches!(result, Err(EngineError::VectorStore(_))));
    }

    #[tokio::test]
    async fn insert_writes_a_batch_in_one_call() {
        let collection = HnswCollection::new(4, IndexParams::default());
        collection
            .insert(vec![
                entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]),
                entry("b.png", 1, vec![0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[tokio::test]
    async fn iterate_filters_by_path_and_directory() {
        let collection = HnswCollection::new(4, IndexParams::default());
        collection
            .insert(vec![
                entry("a.png", 1, vec![1.0, 0.0, 0.0, 0.0]),
                entry("b.png", 2, vec![0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let by_path = collection
            .iterate(VectorFilter::Paths(&["a.png".to_string()]), 10)
            .await
            .unwrap();
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].image_path, "a.png");

        let by_directory = collection.iterate(VectorFilter::Directories(&[2]), 10).await.unwrap();
        assert_eq!(by_directory.len(), 1);
        assert_eq!(by_directory[0].image_path, "b.png");

        let all = collection.iterate(VectorFilter::All, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
