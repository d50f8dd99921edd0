//! Catalog Store (C1): durable directory and image metadata.
//!
//! The catalog owns [`Directory`](crate::types::Directory) and
//! [`Image`](crate::types::Image) rows. Every operation below is a single
//! transaction; the trait guarantees no partial writes within one call, but
//! callers composing several calls get no cross-call atomicity.

mod sqlite;

pub use sqlite::SqliteCatalog;

use std::future::Future;
use std::path::Path;

use crate::error::Result;
use crate::types::{Directory, Image};

/// Capability set a relational catalog backend must provide.
pub trait CatalogStore: Send + Sync {
    /// Looks up a directory by its absolute path.
    fn get_directory_by_path(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Option<Directory>>> + Send;

    /// Creates a new directory row, initially unindexed and enabled.
    fn create_directory(&self, path: &Path) -> impl Future<Output = Result<Directory>> + Send;

    /// Lists every registered directory.
    fn list_directories(&self) -> impl Future<Output = Result<Vec<Directory>>> + Send;

    /// Deletes a directory and, per the catalog's cascading foreign key, all
    /// of its images.
    fn delete_directory(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Enables or disables a directory for search.
    fn set_directory_enabled(
        &self,
        id: i64,
        enabled: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Marks a directory's `is_indexed` flag.
    fn mark_directory_indexed(
        &self,
        id: i64,
        indexed: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Looks up an image by its absolute path.
    fn get_image_by_path(&self, path: &Path) -> impl Future<Output = Result<Option<Image>>> + Send;

    /// Inserts images under a directory, skipping any path that already
    /// exists. Returns the rows actually inserted.
    fn add_images(
        &self,
        directory_id: i64,
        paths: &[std::path::PathBuf],
    ) -> impl Future<Output = Result<Vec<Image>>> + Send;

    /// Lists the unindexed images of a directory.
    fn list_unindexed(&self, directory_id: i64) -> impl Future<Output = Result<Vec<Image>>> + Send;

    /// Lists every image registered under a directory.
    fn list_images_by_directory(
        &self,
        directory_id: i64,
    ) -> impl Future<Output = Result<Vec<Image>>> + Send;

    /// Marks the given image paths `is_indexed = true`.
    fn mark_images_indexed(
        &self,
        paths: &[std::path::PathBuf],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Marks a single image `is_indexed = false` (used by the change watcher
    /// when a file is modified).
    fn mark_image_unindexed(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Deletes a single image row by path.
    fn delete_image(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Updates an image's path (used when a watched move is detected).
    fn rename_image(
        &self,
        old_path: &Path,
        new_path: &Path,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Deletes every image row belonging to a directory.
    fn delete_images_by_directory(
        &self,
        directory_id: i64,
    ) -> impl Future<Output = Result<()>> + Send;
}
