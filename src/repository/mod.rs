//! SQLite persistence layer.
//!
//! Two independent databases: the URL cache (fetch state, unbounded growth)
//! and the upload-history output dataset. Repositories own a database path
//! and open a connection per operation; SQLite's own locking provides the
//! per-key atomicity needed by concurrent fetch tasks.

mod cache;
mod upload;

pub use cache::{CacheEntry, CacheRepository};
pub use upload::{UploadCounts, UploadHistoryRepository};

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Open a connection with the pragmas shared by every repository.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(30))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(conn)
}

/// Parse an RFC 3339 timestamp stored as text, falling back to now.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
