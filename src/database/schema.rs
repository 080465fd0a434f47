//! Database schema

use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// In-memory URL; every pooled connection would get its own database, so
/// the pool keeps exactly one connection alive for it.
pub const MEMORY_DB: &str = "sqlite::memory:";

/// `sqlite:` URL for a database file
pub fn database_url(path: &Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Initialize the catalog database at `db_url` (a path or `sqlite:` URL).
pub async fn initialize_database(db_url: &str) -> Result<Pool<Sqlite>> {
    let in_memory = db_url == MEMORY_DB;

    // Create database if it doesn't exist
    if !in_memory && !Sqlite::database_exists(db_url).await? {
        debug!("Creating database at: {}", db_url);
        Sqlite::create_database(db_url).await?;
    }

    let mut options = SqlitePoolOptions::new().max_connections(5);
    if in_memory {
        options = options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);
    }
    let pool = options.connect(db_url).await?;

    info!("Running database migrations");
    create_tables(&pool).await?;

    Ok(pool)
}

/// Create database tables
async fn create_tables(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            file_path TEXT NOT NULL,
            thumbnail_path TEXT,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            file_size INTEGER NOT NULL DEFAULT 0,
            downloaded_at DATETIME NOT NULL,
            platform TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_downloaded_at ON catalog_entries(downloaded_at)",
    )
    .execute(pool)
    .await?;

    debug!("Database tables created successfully");
    Ok(())
}
