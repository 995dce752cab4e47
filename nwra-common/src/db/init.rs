//! Database initialization
//!
//! Opens (creating when missing) the SQLite database that records which
//! source files have been completely processed.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
///
/// Every connection runs in WAL mode with `synchronous = FULL`, so a committed
/// fingerprint survives a crash immediately after the write returns.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new state database: {}", db_path.display());
    } else {
        info!("Opened existing state database: {}", db_path.display());
    }

    create_processed_files_table(&pool).await?;

    Ok(pool)
}

/// Processed-file fingerprints, one row per (directory, filename)
async fn create_processed_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_files (
            directory TEXT NOT NULL,
            filename TEXT NOT NULL,
            md5sum TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            processed_at TEXT NOT NULL,
            PRIMARY KEY (directory, filename)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
