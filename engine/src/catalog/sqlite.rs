//! SQLite-backed catalog store.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{EngineError, Result};
use crate::types::{Directory, Image};

use super::CatalogStore;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS directories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    is_indexed INTEGER NOT NULL DEFAULT 0,
    is_enabled INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_directories_path ON directories(path);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    directory_id INTEGER NOT NULL REFERENCES directories(id) ON DELETE CASCADE,
    is_indexed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_images_path ON images(path);
CREATE INDEX IF NOT EXISTS idx_images_directory_id ON images(directory_id);
CREATE INDEX IF NOT EXISTS idx_images_is_indexed ON images(is_indexed);
";

fn catalog_err(err: sqlx::Error) -> EngineError {
    EngineError::Catalog(anyhow::Error::new(err))
}

fn directory_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Directory> {
    Ok(Directory {
        id: row.try_get("id").map_err(catalog_err)?,
        path: PathBuf::from(row.try_get::<String, _>("path").map_err(catalog_err)?),
        is_indexed: row.try_get::<i64, _>("is_indexed").map_err(catalog_err)? != 0,
        is_enabled: row.try_get::<i64, _>("is_enabled").map_err(catalog_err)? != 0,
    })
}

fn image_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Image> {
    Ok(Image {
        id: row.try_get("id").map_err(catalog_err)?,
        path: PathBuf::from(row.try_get::<String, _>("path").map_err(catalog_err)?),
        directory_id: row.try_get("directory_id").map_err(catalog_err)?,
        is_indexed: row.try_get::<i64, _>("is_indexed").map_err(catalog_err)? != 0,
    })
}

/// Catalog Store (C1) implemented against an embedded SQLite database.
///
/// Every public method runs as a single transaction against the pool, in
/// line with the "no partial writes within one call" contract.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Opens (creating if necessary) a SQLite catalog at `path`, applying
    /// the schema migration idempotently.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(catalog_err)?;

        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(catalog_err)?;
        }

        Ok(Self { pool })
    }

    /// Opens an in-memory catalog, primarily useful for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }
}

impl CatalogStore for SqliteCatalog {
    async fn get_directory_by_path(&self, path: &Path) -> Result<Option<Directory>> {
        let row = sqlx::query("SELECT id, path, is_indexed, is_enabled FROM directories WHERE path = ?")
            .bind(path.to_string_lossy().to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(catalog_err)?;
        row.as_ref().map(directory_from_row).transpose()
    }

    async fn create_directory(&self, path: &Path) -> Result<Directory> {
        let path_str = path.to_string_lossy().to_string();
        let id = sqlx::query(
            "INSERT INTO directories (path, is_indexed, is_enabled) VALUES (?, 0, 1)",
        )
        .bind(&path_str)
        .execute(&self.pool)
        .await
        .map_err(catalog_err)?
        .last_insert_rowid();

        Ok(Directory {
            id,
            path: path.to_path_buf(),
            is_indexed: false,
            is_enabled: true,
        })
    }

    async fn list_directories(&self) -> Result<Vec<Directory>> {
        let rows = sqlx::query("SELECT id, path, is_indexed, is_enabled FROM directories")
            .fetch_all(&self.pool)
            .await
            .map_err(catalog_err)?;
        rows.iter().map(directory_from_row).collect()
    }

    async fn delete_directory(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM directories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }

    async fn set_directory_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE directories SET is_enabled = ? WHERE id = ?")
            .bind(i64::from(enabled))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }

    async fn mark_directory_indexed(&self, id: i64, indexed: bool) -> Result<()> {
        sqlx::query("UPDATE directories SET is_indexed = ? WHERE id = ?")
            .bind(i64::from(indexed))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }

    async fn get_image_by_path(&self, path: &Path) -> Result<Option<Image>> {
        let row = sqlx::query("SELECT id, path, directory_id, is_indexed FROM images WHERE path = ?")
            .bind(path.to_string_lossy().to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(catalog_err)?;
        row.as_ref().map(image_from_row).transpose()
    }

    async fn add_images(&self, directory_id: i64, paths: &[PathBuf]) -> Result<Vec<Image>> {
        let mut tx = self.pool.begin().await.map_err(catalog_err)?;
        let mut inserted = Vec::new();

        for path in paths {
            let path_str = path.to_string_lossy().to_string();
            let existing = sqlx::query("SELECT id FROM images WHERE path = ?")
                .bind(&path_str)
                .fetch_optional(&mut *tx)
                .await
                .map_err(catalog_err)?;
            if existing.is_some() {
                continue;
            }

            let id = sqlx::query(
                "INSERT INTO images (path, directory_id, is_indexed) VALUES (?, ?, 0)",
            )
            .bind(&path_str)
            .bind(directory_id)
            .execute(&mut *tx)
            .await
            .map_err(catalog_err)?
            .last_insert_rowid();

            inserted.push(Image {
                id,
                path: path.clone(),
                directory_id,
                is_indexed: false,
            });
        }

        tx.commit().await.map_err(catalog_err)?;
        Ok(inserted)
    }

    async fn list_unindexed(&self, directory_id: i64) -> Result<Vec<Image>> {
        let rows = sqlx::query(
            "SELECT id, path, directory_id, is_indexed FROM images WHERE directory_id = ? AND is_indexed = 0",
        )
        .bind(directory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err)?;
        rows.iter().map(image_from_row).collect()
    }

    async fn list_images_by_directory(&self, directory_id: i64) -> Result<Vec<Image>> {
        let rows = sqlx::query(
            "SELECT id, path, directory_id, is_indexed FROM images WHERE directory_id = ?",
        )
        .bind(directory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err)?;
        rows.iter().map(image_from_row).collect()
    }

    async fn mark_images_indexed(&self, paths: &[PathBuf]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(catalog_err)?;
        for path in paths {
            sqlx::query("UPDATE images SET is_indexed = 1 WHERE path = ?")
                .bind(path.to_string_lossy().to_string())
                .execute(&mut *tx)
                .await
                .map_err(catalog_err)?;
        }
        tx.commit().await.map_err(catalog_err)?;
        Ok(())
    }

    async fn mark_image_unindexed(&self, path: &Path) -> Result<()> {
        sqlx::query("UPDATE images SET is_indexed = 0 WHERE path = ?")
            .bind(path.to_string_lossy().to_string())
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }

    async fn delete_image(&self, path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM images WHERE path = ?")
            .bind(path.to_string_lossy().to_string())
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }

    async fn rename_image(&self, old_path: &Path, new_path: &Path) -> Result<()> {
        sqlx::query("UPDATE images SET path = ? WHERE path = ?")
            .bind(new_path.to_string_lossy().to_string())
            .bind(old_path.to_string_lossy().to_string())
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }

    async fn delete_images_by_directory(&self, directory_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM images WHERE directory_id = ?")
            .bind(directory_id)
            .execute(&self.pool)
            .await
            .map_err(catalog_err)?;
        Ok(())
    }
}
