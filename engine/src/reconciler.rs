//! Consistency Reconciler (C8): periodically reconciles the filesystem,
//! catalog, and vector store rather than relying on a distributed
//! transaction across all three.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::CatalogStore;
use crate::embedders::EmbedderSet;
use crate::error::{EngineError, Result};
use crate::queue::{IndexingQueue, PRIORITY_SCAN};
use crate::scanner;
use crate::vector::{VectorFilter, VectorStoreSet};

/// Counts of repairs made by one reconciliation pass, surfaced for
/// observability rather than control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Files found on disk with no catalog row; re-enqueued for indexing.
    pub orphaned_on_disk: usize,
    /// Catalog rows whose file no longer exists; deleted.
    pub missing_on_disk: usize,
    /// Images marked indexed but absent from at least one embedder's
    /// collection; reset to unindexed and re-enqueued.
    pub incomplete_embeddings: usize,
    /// Vector entries present in a collection but absent from the catalog;
    /// deleted from every collection.
    pub orphaned_vectors: usize,
    /// Registered directories whose path no longer exists on disk; removed
    /// along with their images and vectors.
    pub directories_removed: usize,
}

/// Runs a single reconciliation pass over every registered directory.
pub async fn reconcile<C: CatalogStore>(
    catalog: &Arc<C>,
    vectors: &Arc<VectorStoreSet>,
    embedders: &Arc<EmbedderSet>,
    queue: &Arc<IndexingQueue>,
    recursive: bool,
    follow_symlinks: bool,
) -> Result<ReconciliationReport> {
    let mut report = ReconciliationReport::default();
    let embedder_names = embedders.list();

    for directory in catalog.list_directories().await? {
        if !directory.is_enabled {
            continue;
        }

        if !directory.path.exists() {
            let images = catalog.list_images_by_directory(directory.id).await?;
            for image in &images {
                vectors.remove_everywhere(&image.path.to_string_lossy()).await?;
            }
            catalog.delete_images_by_directory(directory.id).await?;
            catalog.delete_directory(directory.id).await?;
            report.directories_removed += 1;
            continue;
        }

        let on_disk: HashSet<_> = scanner::scan(&directory.path, recursive, follow_symlinks)?
            .into_iter()
            .collect();
        let catalogued = catalog.list_images_by_directory(directory.id).await?;
        let catalogued_paths: HashSet<_> = catalogued.iter().map(|image| image.path.clone()).collect();
        let mut needs_reindex = false;

        let orphaned: Vec<_> = on_disk.difference(&catalogued_paths).cloned().collect();
        if !orphaned.is_empty() {
            catalog.add_images(directory.id, &orphaned).await?;
            report.orphaned_on_disk += orphaned.len();
            needs_reindex = true;
        }

        for image in &catalogued {
            if on_disk.contains(&image.path) {
                continue;
            }
            catalog.delete_image(&image.path).await?;
            vectors.remove_everywhere(&image.path.to_string_lossy()).await?;
            report.missing_on_disk += 1;
        }

        // Vector entries whose image has no surviving catalog row (deleted
        // above, or never reconciled back in) are orphans: nothing will ever
        // ask the catalog to remove them otherwise.
        let surviving_paths: HashSet<String> = catalog
            .list_images_by_directory(directory.id)
            .await?
            .iter()
            .map(|image| image.path.to_string_lossy().to_string())
            .collect();

        for embedder_name in &embedder_names {
            let entries = match vectors
                .iterate(embedder_name, VectorFilter::Directories(&[directory.id]), 256)
                .await
            {
                Ok(entries) => entries,
                Err(EngineError::NotFound(_)) => continue,
                Err(error) => return Err(error),
            };
            for entry in entries {
                if !surviving_paths.contains(&entry.image_path) {
                    vectors.remove_everywhere(&entry.image_path).await?;
                    report.orphaned_vectors += 1;
                }
            }
        }

        for image in catalogued.iter().filter(|image| image.is_indexed && on_disk.contains(&image.path)) {
            let image_key = image.path.to_string_lossy().to_string();
            let present_everywhere = embedder_names.iter().all(|name| {
                vectors
                    .snapshot(name)
                    .map(|entries| entries.iter().any(|entry| entry.image_path == image_key))
                    .unwrap_or(false)
            });
            if !present_everywhere {
                catalog.mark_image_unindexed(&image.path).await?;
                report.incomplete_embeddings += 1;
                needs_reindex = true;
            }
        }

        let remaining_unindexed = catalog.list_unindexed(directory.id).await?;
        catalog
            .mark_directory_indexed(directory.id, remaining_unindexed.is_empty())
            .await?;

        if needs_reindex {
            queue.enqueue(directory.id, directory.path.clone(), PRIORITY_SCAN);
        }
    }

    Ok(report)
}

/// Spawns a background task that runs [`reconcile`] every `interval` until
/// `shutdown` fires.
pub fn spawn_periodic<C: CatalogStore + 'static>(
    catalog: Arc<C>,
    vectors: Arc<VectorStoreSet>,
    embedders: Arc<EmbedderSet>,
    queue: Arc<IndexingQueue>,
    interval: Duration,
    recursive: bool,
    follow_symlinks: bool,
    shutdown: Arc<tokio::sync::Notify>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match reconcile(&catalog, &vectors, &embedders, &queue, recursive, follow_symlinks).await {
                        Ok(report) => tracing::info!(?report, "consistency reconciliation pass complete"),
                        Err(error) => tracing::warn!(%error, "consistency reconciliation pass failed"),
                    }
                }
                () = shutdown.notified() => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::embedders::{DynEmbedderHandle, EmbedderSet};
    use retrieval_core::{Embedder, Embedding};
    use std::fs;

    struct StubEmbedder;
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }
        fn dim(&self) -> usize {
            2
        }
        async fn embed(&self, _image: &[u8]) -> retrieval_core::Result<Embedding> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn enqueues_files_missing_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();

        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        catalog.create_directory(dir.path()).await.unwrap();
        let vectors = Arc::new(VectorStoreSet::new());
        let embedders = Arc::new(EmbedderSet::new(vec![DynEmbedderHandle::new(StubEmbedder)]));
        let queue = IndexingQueue::new();

        let report = reconcile(&catalog, &vectors, &embedders, &queue, false, false)
            .await
            .unwrap();
        assert_eq!(report.orphaned_on_disk, 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn removes_catalog_rows_for_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        let directory = catalog.create_directory(dir.path()).await.unwrap();
        catalog
            .add_images(directory.id, &[dir.path().join("gone.png")])
            .await
            .unwrap();

        let vectors = Arc::new(VectorStoreSet::new());
        let embedders = Arc::new(EmbedderSet::new(vec![DynEmbedderHandle::new(StubEmbedder)]));
        let queue = IndexingQueue::new();

        let report = reconcile(&catalog, &vectors, &embedders, &queue, false, false)
            .await
            .unwrap();
        assert_eq!(report.missing_on_disk, 1);
        assert!(catalog.list_images_by_directory(directory.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removes_directory_whose_path_no_longer_exists() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        let directory = catalog.create_directory(dir.path()).await.unwrap();
        catalog
            .add_images(directory.id, &[dir.path().join("a.png")])
            .await
            .unwrap();

        let vectors = Arc::new(VectorStoreSet::new());
        let embedders = Arc::new(EmbedderSet::new(vec![DynEmbedderHandle::new(StubEmbedder)]));
        let queue = IndexingQueue::new();

        dir.close().unwrap();

        let report = reconcile(&catalog, &vectors, &embedders, &queue, false, false)
            .await
            .unwrap();
        assert_eq!(report.directories_removed, 1);
        assert!(catalog.list_directories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removes_vector_entries_with_no_surviving_catalog_row() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        let directory = catalog.create_directory(dir.path()).await.unwrap();

        let vectors = Arc::new(VectorStoreSet::new());
        vectors.create_if_absent("stub", 2, crate::config::IndexParams::default());
        vectors
            .upsert(
                "stub",
                crate::types::VectorEntry {
                    directory_id: directory.id,
                    image_path: dir.path().join("ghost.png").to_string_lossy().to_string(),
                    embedding: vec![1.0, 0.0],
                },
            )
            .await
            .unwrap();

        let embedders = Arc::new(EmbedderSet::new(vec![DynEmbedderHandle::new(StubEmbedder)]));
        let queue = IndexingQueue::new();

        let report = reconcile(&catalog, &vectors, &embedders, &queue, false, false)
            .await
            .unwrap();
        assert_eq!(report.orphaned_vectors, 1);
        assert_eq!(vectors.snapshot("stub").unwrap().len(), 0);
    }
}
