//! Vector Store (C2): one approximate nearest-neighbor collection per
//! embedder, queried by cosine similarity.

mod hnsw;
pub mod store;

pub use hnsw::HnswCollection;
pub use store::VectorStoreSet;

use std::future::Future;

use crate::error::Result;
use crate::types::VectorEntry;

/// Restricts which entries [`VectorCollection::iterate`] returns.
#[derive(Debug, Clone, Copy)]
pub enum VectorFilter<'a> {
    /// Every entry in the collection.
    All,
    /// Only entries whose `image_path` is one of the given paths.
    Paths(&'a [String]),
    /// Only entries whose `directory_id` is one of the given ids.
    Directories(&'a [i64]),
}

/// A single embedder's ANN collection.
///
/// Implementations own the mapping from `image_path` to embedding and
/// directory id, and the index structure used to answer nearest-neighbor
/// queries against it.
pub trait VectorCollection: Send + Sync {
    /// Inserts or replaces the entry for `entry.image_path`.
    fn upsert(&self, entry: VectorEntry) -> impl Future<Output = Result<()>> + Send;

    /// Inserts or replaces many entries in one call. Directory indexing
    /// uses this instead of one `upsert` per image so a batch's embeddings
    /// reach the index in a single write.
    fn insert(&self, entries: Vec<VectorEntry>) -> impl Future<Output = Result<()>> + Send;

    /// Removes the entry for `image_path`, if present.
    fn remove(&self, image_path: &str) -> impl Future<Output = Result<()>> + Send;

    /// Returns the `k` nearest neighbors to `query` by cosine similarity,
    /// restricted to images whose directory id is in `allowed_directories`
    /// when that slice is non-empty.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        allowed_directories: &[i64],
    ) -> impl Future<Output = Result<Vec<(String, f32)>>> + Send;

    /// Returns every entry matching `filter`, read in chunks of `batch_size`
    /// internally. The in-memory backend holds everything already, but the
    /// signature matches what a paging ANN backend would need, and callers
    /// (the reconciler, a rename) rely on the filtering rather than the
    /// chunking.
    fn iterate(
        &self,
        filter: VectorFilter<'_>,
        batch_size: usize,
    ) -> impl Future<Output = Result<Vec<VectorEntry>>> + Send;

    /// Number of entries currently stored.
    fn len(&self) -> usize;

    /// Whether the collection holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
