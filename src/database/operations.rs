//! Catalog CRUD operations

use crate::database::schema::initialize_database;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A completed download kept in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Assigned by the store on first insert
    pub id: Option<i64>,
    pub title: String,
    pub url: String,
    pub file_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub duration_ms: u64,
    pub file_size: u64,
    pub downloaded_at: DateTime<Utc>,
    pub platform: String,
}

/// Single-table catalog store with a live `list_all` subscription.
///
/// Every successful mutation republishes the full ordered list to
/// subscribers. The store never looks at the filesystem except for the
/// best-effort file removal in [`CatalogStore::delete_with_file`].
#[derive(Clone)]
pub struct CatalogStore {
    pool: Pool<Sqlite>,
    live: Arc<watch::Sender<Vec<CatalogEntry>>>,
}

impl CatalogStore {
    /// Open (creating if needed) the catalog at `db_url`.
    pub async fn open(db_url: &str) -> Result<Self> {
        let pool = initialize_database(db_url).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an already initialized pool.
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let (live, _) = watch::channel(Vec::new());
        let store = Self {
            pool,
            live: Arc::new(live),
        };
        let entries = store.list_all().await?;
        info!("Catalog opened with {} entries", entries.len());
        store.live.send_replace(entries);
        Ok(store)
    }

    /// Insert an entry, replacing any row with the same id.
    ///
    /// Returns the id of the stored row; an entry without id gets a fresh one.
    pub async fn insert(&self, entry: &CatalogEntry) -> Result<i64> {
        let duration_ms = i64::try_from(entry.duration_ms)
            .with_context(|| format!("duration {} ms out of range", entry.duration_ms))?;
        let file_size = i64::try_from(entry.file_size)
            .with_context(|| format!("file size {} out of range", entry.file_size))?;

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO catalog_entries
            (id, title, url, file_path, thumbnail_path, duration_ms, file_size, downloaded_at, platform)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.title)
        .bind(&entry.url)
        .bind(entry.file_path.to_string_lossy().into_owned())
        .bind(entry.thumbnail_path.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .bind(duration_ms)
        .bind(file_size)
        .bind(entry.downloaded_at)
        .bind(&entry.platform)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Saved catalog entry {}: {}", id, entry.title);
        self.publish().await;
        Ok(id)
    }

    /// Delete by id. Returns whether a row was removed.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!("Deleted catalog entry {} (found: {})", id, removed);
        if removed {
            self.publish().await;
        }
        Ok(removed)
    }

    /// Delete the record, then try to remove its file.
    ///
    /// The file removal is independent of the record: its failure is logged
    /// and does not undo the delete.
    pub async fn delete_with_file(&self, entry: &CatalogEntry) -> Result<bool> {
        let removed = match entry.id {
            Some(id) => self.delete(id).await?,
            None => false,
        };

        if let Err(e) = tokio::fs::remove_file(&entry.file_path).await {
            warn!("Failed to delete file {:?}: {}", entry.file_path, e);
        }
        Ok(removed)
    }

    /// Get one entry by id
    pub async fn get(&self, id: i64) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query("SELECT * FROM catalog_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_into_entry).transpose()
    }

    /// All entries, newest first
    pub async fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query("SELECT * FROM catalog_entries ORDER BY downloaded_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_into_entry).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM catalog_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Live view of `list_all`, updated after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<CatalogEntry>> {
        self.live.subscribe()
    }

    /// Close the underlying pool; later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn publish(&self) {
        match self.list_all().await {
            Ok(entries) => {
                self.live.send_replace(entries);
            }
            Err(e) => warn!("Failed to refresh catalog subscribers: {}", e),
        }
    }
}

/// Convert database row to catalog entry
fn row_into_entry(row: sqlx::sqlite::SqliteRow) -> Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: Some(row.try_get("id")?),
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        file_path: PathBuf::from(row.try_get::<String, _>("file_path")?),
        thumbnail_path: row
            .try_get::<Option<String>, _>("thumbnail_path")?
            .map(PathBuf::from),
        duration_ms: row.try_get::<i64, _>("duration_ms")?.max(0) as u64,
        file_size: row.try_get::<i64, _>("file_size")?.max(0) as u64,
        downloaded_at: row.try_get("downloaded_at")?,
        platform: row.try_get("platform")?,
    })
}
