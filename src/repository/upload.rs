//! Upload-history output dataset.
//!
//! Holds the deduplicated `upload_history` table, its `upload_history_closes`
//! child rows, and the append-only `parse_failures` error log. Deduplication
//! is enforced by the UNIQUE constraint on `message_id`, not by a
//! read-then-write check, so concurrent or repeated runs cannot race a
//! duplicate past the application.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection};

use super::Result;
use crate::models::{ParseFailure, ParsedUpload};

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadCounts {
    pub uploads: u64,
    pub closes: u64,
    pub failures: u64,
}

/// SQLite-backed repository for parsed upload records.
#[derive(Debug, Clone)]
pub struct UploadHistoryRepository {
    db_path: PathBuf,
}

impl UploadHistoryRepository {
    /// Open (creating if needed) the output database at the given path.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS upload_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                version TEXT NOT NULL,
                date TEXT NOT NULL,
                changed_by_name TEXT NOT NULL,
                changed_by_email TEXT NOT NULL,
                maintainer_name TEXT NOT NULL,
                maintainer_email TEXT NOT NULL,
                message_id TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS upload_history_closes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                upload_history_id INTEGER NOT NULL REFERENCES upload_history(id),
                bug INTEGER NOT NULL
            );

            -- Messages that failed to fetch or parse, kept verbatim.
            CREATE TABLE IF NOT EXISTS parse_failures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_upload_history_source
                ON upload_history(source);
            CREATE INDEX IF NOT EXISTS idx_upload_history_closes_upload
                ON upload_history_closes(upload_history_id);
        "#,
        )?;
        Ok(())
    }

    /// Insert a record and its closes rows as one transaction, unless a row
    /// with the same message id already exists.
    ///
    /// Returns `true` if the record was inserted, `false` on a duplicate.
    pub fn insert_if_absent(&self, upload: &ParsedUpload) -> Result<bool> {
        let date = upload.date.to_rfc3339();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            r#"INSERT OR IGNORE INTO upload_history (
                source, version, date,
                changed_by_name, changed_by_email,
                maintainer_name, maintainer_email,
                message_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                upload.source,
                upload.version,
                date,
                upload.changed_by_name,
                upload.changed_by_email,
                upload.maintainer_name,
                upload.maintainer_email,
                upload.message_id,
            ],
        )?;

        if inserted == 0 {
            tx.commit()?;
            return Ok(false);
        }

        let upload_id = tx.last_insert_rowid();
        for bug in &upload.closes {
            tx.execute(
                "INSERT INTO upload_history_closes (upload_history_id, bug) VALUES (?1, ?2)",
                params![upload_id, *bug as i64],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    /// Append a failure to the error log. Independent of the record
    /// transaction; never read back by the pipeline.
    pub fn record_failure(&self, failure: &ParseFailure) -> Result<()> {
        let recorded_at = Utc::now().to_rfc3339();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO parse_failures (message_id, raw_text, recorded_at) VALUES (?1, ?2, ?3)",
            params![failure.message_id, failure.raw_text, recorded_at],
        )?;
        Ok(())
    }

    /// Bug numbers stored for a given message id, for verification and status.
    pub fn closes_for_message(&self, message_id: &str) -> Result<Vec<u32>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"SELECT c.bug FROM upload_history_closes c
               JOIN upload_history u ON u.id = c.upload_history_id
               WHERE u.message_id = ?1
               ORDER BY c.bug"#,
        )?;
        let bugs = stmt
            .query_map(params![message_id], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bugs.into_iter().map(|b| b as u32).collect())
    }

    /// Row counts across the output dataset.
    pub fn counts(&self) -> Result<UploadCounts> {
        let conn = self.connect()?;
        let uploads: i64 =
            conn.query_row("SELECT COUNT(*) FROM upload_history", [], |row| row.get(0))?;
        let closes: i64 = conn.query_row("SELECT COUNT(*) FROM upload_history_closes", [], |row| {
            row.get(0)
        })?;
        let failures: i64 =
            conn.query_row("SELECT COUNT(*) FROM parse_failures", [], |row| row.get(0))?;
        Ok(UploadCounts {
            uploads: uploads as u64,
            closes: closes as u64,
            failures: failures as u64,
        })
    }
}
