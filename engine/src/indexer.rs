//! Directory Indexer (C6): scans a directory, embeds newly discovered or
//! stale images in batches, and writes them into the vector store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::embedders::EmbedderSet;
use crate::error::Result;
use crate::scanner;
use crate::types::{Directory, VectorEntry};
use crate::vector::VectorStoreSet;

/// Drives a full or incremental indexing pass over one directory.
pub struct DirectoryIndexer<C: CatalogStore> {
    catalog: Arc<C>,
    vectors: Arc<VectorStoreSet>,
    embedders: Arc<EmbedderSet>,
    batch_size: usize,
    recursive: bool,
    follow_symlinks: bool,
}

impl<C: CatalogStore> DirectoryIndexer<C> {
    /// Creates an indexer over the given collaborators.
    pub fn new(
        catalog: Arc<C>,
        vectors: Arc<VectorStoreSet>,
        embedders: Arc<EmbedderSet>,
        batch_size: usize,
        recursive: bool,
        follow_symlinks: bool,
    ) -> Self {
        Self {
            catalog,
            vectors,
            embedders,
            batch_size: batch_size.max(1),
            recursive,
            follow_symlinks,
        }
    }

    /// Scans `directory` for images, registers any not yet in the catalog,
    /// then embeds every unindexed image in batches.
    ///
    /// A failed batch (e.g. a transient vector store error) is logged and
    /// skipped rather than aborting the whole pass; those images remain
    /// unindexed and are retried on the next pass. The directory is marked
    /// indexed only once no unindexed image remains.
    pub async fn index_directory(&self, directory: &Directory) -> Result<()> {
        self.index_directory_path(directory.id, &directory.path).await
    }

    /// Same as [`DirectoryIndexer::index_directory`], taking the directory
    /// id and path directly rather than a full [`Directory`] row. Used by
    /// the indexing queue's workers, which carry only an id and path per
    /// item.
    pub async fn index_directory_path(&self, directory_id: i64, path: &Path) -> Result<()> {
        let discovered = scanner::scan(path, self.recursive, self.follow_symlinks)?;
        if !discovered.is_empty() {
            self.catalog.add_images(directory_id, &discovered).await?;
        }

        let unindexed = self.catalog.list_unindexed(directory_id).await?;
        for batch in unindexed.chunks(self.batch_size) {
            self.index_batch(directory_id, batch.iter().map(|image| image.path.clone()).collect())
                .await;
        }

        let remaining = self.catalog.list_unindexed(directory_id).await?;
        self.catalog
            .mark_directory_indexed(directory_id, remaining.is_empty())
            .await?;
        Ok(())
    }

    async fn index_batch(&self, directory_id: i64, paths: Vec<PathBuf>) {
        // An unreadable image gets a zero vector rather than being dropped
        // from the batch: the directory must still be able to reach
        // `is_indexed = true` even if one of its files is permanently
        // corrupt or unreadable.
        let mut readable_paths = Vec::with_capacity(paths.len());
        let mut readable_bytes = Vec::with_capacity(paths.len());
        let mut unreadable_paths = Vec::new();

        for path in paths {
            match load_image(&path) {
                Ok(bytes) => {
                    readable_paths.push(path);
                    readable_bytes.push(bytes);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "substituting zero vector for unreadable image");
                    unreadable_paths.push(path);
                }
            }
        }

        if readable_paths.is_empty() && unreadable_paths.is_empty() {
            return;
        }

        let mut succeeded = Vec::with_capacity(readable_paths.len() + unreadable_paths.len());

        for embedder_name in self.embedders.list() {
            let Ok(embedder) = self.embedders.get(&embedder_name) else {
                continue;
            };

            let embedded = if readable_bytes.is_empty() {
                Vec::new()
            } else {
                match embedder.embed_batch(&readable_bytes).await {
                    Ok(vectors) => vectors,
                    Err(error) => {
                        tracing::warn!(embedder = %embedder_name, %error, "batch embedding failed");
                        continue;
                    }
                }
            };

            self.vectors
                .create_if_absent(&embedder_name, embedder.dim(), crate::config::IndexParams::default());

            let mut entries = Vec::with_capacity(readable_paths.len() + unreadable_paths.len());
            entries.extend(readable_paths.iter().zip(embedded).map(|(path, embedding)| VectorEntry {
                directory_id,
                image_path: path.to_string_lossy().to_string(),
                embedding,
            }));
            entries.extend(unreadable_paths.iter().map(|path| VectorEntry {
                directory_id,
                image_path: path.to_string_lossy().to_string(),
                embedding: vec![0.0; embedder.dim()],
            }));

            let written_paths: Vec<&PathBuf> = readable_paths.iter().chain(unreadable_paths.iter()).collect();
            if let Err(error) = self.vectors.insert(&embedder_name, entries).await {
                tracing::warn!(embedder = %embedder_name, %error, "failed to write embedding batch");
                continue;
            }
            succeeded.extend(written_paths.into_iter().cloned());
        }

        succeeded.sort();
        succeeded.dedup();
        if let Err(error) = self.catalog.mark_images_indexed(&succeeded).await {
            tracing::warn!(%error, "failed to mark images indexed after successful embedding");
        }
    }
}

fn load_image(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}
