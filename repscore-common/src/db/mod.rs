//! Database access
//!
//! SQLite pool setup and table creation for the score store and the
//! key/value settings table.

pub mod models;
pub mod scores;
pub mod settings;

pub use models::*;
pub use scores::SqliteScoreStore;

use crate::{Error, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the database file (and its parent directory) on first start.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with all tables created.
///
/// Uses a single connection because every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // platform_id is deliberately not unique: a renamed profile can briefly
    // own two rows until the duplicate cleanup job removes the later one.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scores (
            key TEXT PRIMARY KEY,
            screen_name TEXT NOT NULL,
            platform_id INTEGER NOT NULL,
            last_updated_ms INTEGER NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            grades TEXT NOT NULL DEFAULT '{}',
            profile_text TEXT NOT NULL,
            timeline_text TEXT,
            hashtags TEXT NOT NULL DEFAULT '[]',
            websites TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_scores_platform_scan ON scores (platform_id, last_updated_ms, key)",
        "CREATE INDEX IF NOT EXISTS idx_scores_last_updated ON scores (last_updated_ms)",
        "CREATE INDEX IF NOT EXISTS idx_scores_score ON scores (score)",
        "CREATE INDEX IF NOT EXISTS idx_scores_screen_name ON scores (lower(screen_name))",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Database tables initialized (settings, scores)");

    Ok(())
}

/// Map an `Err` from sqlx through the store error taxonomy
pub(crate) fn store_err(err: sqlx::Error) -> Error {
    Error::from_store(err)
}
