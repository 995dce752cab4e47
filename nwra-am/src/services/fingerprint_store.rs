//! Processed-file fingerprint store
//!
//! A file counts as processed when a fingerprint exists for its
//! (directory, filename) and the stored MD5 matches the file's current
//! content. Fingerprints are written only after a file's whole unit of work
//! has succeeded, so an interrupted or partially failed run is resumed simply
//! by running again.

use chrono::{DateTime, Utc};
use nwra_common::time::from_system_time;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer used while hashing
const HASH_CHUNK: usize = 1 << 20;

/// Persisted record of a successfully processed file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFingerprint {
    pub directory: String,
    pub filename: String,
    pub md5sum: String,
    /// Modification time of the file when it was processed
    pub modified_at: DateTime<Utc>,
    /// When processing completed
    pub processed_at: DateTime<Utc>,
}

/// Identity of a file on disk at one moment
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub directory: String,
    pub filename: String,
    pub md5sum: String,
    pub modified_at: DateTime<Utc>,
}

impl FileStat {
    /// Fingerprint for this content, processed at `processed_at`
    pub fn fingerprint(&self, processed_at: DateTime<Utc>) -> ProcessedFingerprint {
        ProcessedFingerprint {
            directory: self.directory.clone(),
            filename: self.filename.clone(),
            md5sum: self.md5sum.clone(),
            modified_at: self.modified_at,
            processed_at,
        }
    }
}

/// Calculate the MD5 hash of file contents as lowercase hex
pub fn calculate_file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_CHUNK];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Directory, filename, content hash and modification time of a file
pub fn file_stat(path: &Path) -> io::Result<FileStat> {
    let metadata = std::fs::metadata(path)?;
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no filename"))?;

    Ok(FileStat {
        directory,
        filename,
        md5sum: calculate_file_md5(path)?,
        modified_at: from_system_time(metadata.modified()?),
    })
}

/// Fingerprint store backed by the shared SQLite state database
///
/// Cloning is cheap; clones share the connection pool. Writes are
/// upserts keyed by (directory, filename), so concurrent workers recording
/// different files never interfere and the last write for a key wins.
#[derive(Clone)]
pub struct FingerprintStore {
    db: SqlitePool,
}

impl FingerprintStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (creating if needed) the state database at `db_path`
    pub async fn open(db_path: &Path) -> nwra_common::Result<Self> {
        let pool = nwra_common::db::init_database(db_path).await?;
        Ok(Self::new(pool))
    }

    /// True only if a fingerprint exists for (directory, filename) with this hash
    pub async fn is_processed(
        &self,
        directory: &str,
        filename: &str,
        md5sum: &str,
    ) -> Result<bool, sqlx::Error> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT md5sum FROM processed_files WHERE directory = ? AND filename = ?",
        )
        .bind(directory)
        .bind(filename)
        .fetch_optional(&self.db)
        .await?;

        Ok(stored.as_deref() == Some(md5sum))
    }

    /// Persist or overwrite the fingerprint for (directory, filename)
    ///
    /// Returns after the write is committed.
    pub async fn record(&self, fingerprint: &ProcessedFingerprint) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO processed_files (directory, filename, md5sum, modified_at, processed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(directory, filename) DO UPDATE SET
                md5sum = excluded.md5sum,
                modified_at = excluded.modified_at,
                processed_at = excluded.processed_at
            "#,
        )
        .bind(&fingerprint.directory)
        .bind(&fingerprint.filename)
        .bind(&fingerprint.md5sum)
        .bind(fingerprint.modified_at.to_rfc3339())
        .bind(fingerprint.processed_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        tracing::debug!(
            directory = %fingerprint.directory,
            filename = %fingerprint.filename,
            md5sum = %fingerprint.md5sum,
            "Fingerprint recorded"
        );

        Ok(())
    }

    /// Load the fingerprint for (directory, filename)
    pub async fn load(
        &self,
        directory: &str,
        filename: &str,
    ) -> Result<Option<ProcessedFingerprint>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT directory, filename, md5sum, modified_at, processed_at
            FROM processed_files
            WHERE directory = ? AND filename = ?
            "#,
        )
        .bind(directory)
        .bind(filename)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| row_to_fingerprint(&row)).transpose()
    }

    /// All fingerprints, ordered by directory then filename
    pub async fn load_all(&self) -> Result<Vec<ProcessedFingerprint>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT directory, filename, md5sum, modified_at, processed_at
            FROM processed_files
            ORDER BY directory, filename
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_fingerprint).collect()
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

fn row_to_fingerprint(row: &sqlx::sqlite::SqliteRow) -> Result<ProcessedFingerprint, sqlx::Error> {
    let parse = |column: &str| -> Result<DateTime<Utc>, sqlx::Error> {
        let text: String = row.try_get(column)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(e),
            })
    };

    Ok(ProcessedFingerprint {
        directory: row.try_get("directory")?,
        filename: row.try_get("filename")?,
        md5sum: row.try_get("md5sum")?,
        modified_at: parse("modified_at")?,
        processed_at: parse("processed_at")?,
    })
}
