//! Change Watcher (C7): reacts to filesystem create/modify/remove/rename
//! events for registered, enabled directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use tokio::sync::mpsc;

use crate::catalog::CatalogStore;
use crate::queue::{IndexingQueue, PRIORITY_WATCH};
use crate::vector::VectorStoreSet;

/// Debounce window applied before a burst of filesystem events is
/// delivered, collapsing editors' save-as-temp-then-rename dance into a
/// single event.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Watches one directory for image file changes and reflects them into the
/// catalog, vector store, and indexing queue.
///
/// Every handler here is idempotent: re-delivering the same event (which
/// the underlying OS watcher can do) must never corrupt state, only repeat
/// a no-op write.
pub struct ChangeWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, FileIdMap>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher").finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    /// Starts watching `path` (registered as `directory_id`), dispatching
    /// events onto `queue` and reflecting deletes/renames directly into
    /// `catalog` and `vectors`.
    pub fn watch<C>(
        path: &Path,
        directory_id: i64,
        catalog: Arc<C>,
        vectors: Arc<VectorStoreSet>,
        queue: Arc<IndexingQueue>,
        recursive: bool,
    ) -> notify::Result<Self>
    where
        C: CatalogStore + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, move |result: DebounceEventResult| {
            let _ = tx.send(result);
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        debouncer.watch(path, mode)?;
        let directory_path = path.to_path_buf();

        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(events) => {
                        for event in events {
                            handle_event(
                                &event.event.kind,
                                &event.event.paths,
                                directory_id,
                                &directory_path,
                                &catalog,
                                &vectors,
                                &queue,
                            )
                            .await;
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            tracing::warn!(%error, "filesystem watch error");
                        }
                    }
                }
            }
        });

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

async fn handle_event<C: CatalogStore>(
    kind: &EventKind,
    paths: &[PathBuf],
    directory_id: i64,
    directory_path: &Path,
    catalog: &Arc<C>,
    vectors: &Arc<VectorStoreSet>,
    queue: &Arc<IndexingQueue>,
) {
    match kind {
        EventKind::Create(_) => {
            let mut any_registered = false;
            for path in paths.iter().filter(|p| is_image(p)) {
                if let Err(error) = catalog.add_images(directory_id, std::slice::from_ref(path)).await {
                    tracing::warn!(path = %path.display(), %error, "failed to register new image");
                    continue;
                }
                any_registered = true;
            }
            if any_registered {
                queue.enqueue(directory_id, directory_path.to_path_buf(), PRIORITY_WATCH);
            }
        }
        EventKind::Modify(_) if paths.len() == 2 => {
            // A rename/move is reported as a two-path modify event: [old, new].
            let (old_path, new_path) = (&paths[0], &paths[1]);
            if let Err(error) = catalog.rename_image(old_path, new_path).await {
                tracing::warn!(%error, "failed to apply rename in catalog");
                return;
            }
            // The embedding itself didn't change, only its key: move the
            // existing vectors under the new path rather than re-embedding.
            if let Err(error) = vectors
                .rename_everywhere(&old_path.to_string_lossy(), &new_path.to_string_lossy())
                .await
            {
                tracing::warn!(%error, "failed to move vector entries after rename");
            }
        }
        EventKind::Modify(_) => {
            let mut any_modified = false;
            for path in paths.iter().filter(|p| is_image(p)) {
                if let Err(error) = catalog.mark_image_unindexed(path).await {
                    tracing::warn!(path = %path.display(), %error, "failed to mark modified image unindexed");
                    continue;
                }
                if let Err(error) = vectors.remove_everywhere(&path.to_string_lossy()).await {
                    tracing::warn!(path = %path.display(), %error, "failed to remove stale vector entries for modified image");
                }
                any_modified = true;
            }
            if any_modified {
                queue.enqueue(directory_id, directory_path.to_path_buf(), PRIORITY_WATCH);
            }
        }
        EventKind::Remove(_) => {
            for path in paths.iter().filter(|p| is_image(p)) {
                if let Err(error) = catalog.delete_image(path).await {
                    tracing::warn!(path = %path.display(), %error, "failed to delete image from catalog");
                }
                if let Err(error) = vectors.remove_everywhere(&path.to_string_lossy()).await {
                    tracing::warn!(path = %path.display(), %error, "failed to remove vector entries for deleted image");
                }
            }
        }
        _ => {}
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
}
