//! Persistent URL cache backing both archive fetchers.
//!
//! The cache is a durable url -> (content, fetched_at) map with no freshness
//! policy of its own; each caller decides whether a present entry is usable.
//! Bodies are gzip-compressed on disk since the archive grows without bound.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{params, Connection, OptionalExtension};
use url::Url;

use super::{parse_datetime, Result};

/// A cached response body and when it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// SQLite-backed URL cache.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    db_path: PathBuf,
}

impl CacheRepository {
    /// Open (creating if needed) the cache database at the given path.
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
            CREATE TABLE IF NOT EXISTS url_cache (
                url TEXT PRIMARY KEY,
                fetched_at TEXT NOT NULL,
                gzip_content BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Look up a cached response by URL.
    pub fn get(&self, url: &Url) -> Result<Option<CacheEntry>> {
        let key = canonical_key(url);
        let conn = self.connect()?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT fetched_at, gzip_content FROM url_cache WHERE url = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((fetched_at, compressed)) => Ok(Some(CacheEntry {
                content: decompress(&compressed)?,
                fetched_at: parse_datetime(&fetched_at),
            })),
            None => Ok(None),
        }
    }

    /// Store (or overwrite on revalidation) a response body.
    pub fn put(&self, url: &Url, content: &[u8], fetched_at: DateTime<Utc>) -> Result<()> {
        let key = canonical_key(url);
        let compressed = compress(content)?;
        let fetched_at = fetched_at.to_rfc3339();
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO url_cache (url, fetched_at, gzip_content) VALUES (?1, ?2, ?3)",
            params![key, fetched_at, compressed],
        )?;
        Ok(())
    }

    /// Number of cached entries.
    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM url_cache", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Canonical request identity for a URL. `url::Url` parsing already
/// normalizes scheme/host case and drops default ports, so the serialized
/// form is stable across formatting differences in the source HTML.
fn canonical_key(url: &Url) -> String {
    url.as_str().to_string()
}

fn compress(content: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    Ok(encoder.finish()?)
}

fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut content = Vec::new();
    decoder.read_to_end(&mut content)?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_repo() -> (tempfile::TempDir, CacheRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = CacheRepository::new(&dir.path().join("cache.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_get_absent() {
        let (_dir, repo) = temp_repo();
        let url = Url::parse("https://lists.example.org/2008/01/msg00001.html").unwrap();
        assert!(repo.get(&url).unwrap().is_none());
    }

    #[test]
    fn test_put_then_get_roundtrip() {
        let (_dir, repo) = temp_repo();
        let url = Url::parse("https://lists.example.org/2008/01/msg00001.html").unwrap();
        let fetched_at = Utc::now();
        repo.put(&url, b"Source: foo\nVersion: 1.0-1\n", fetched_at)
            .unwrap();

        let entry = repo.get(&url).unwrap().unwrap();
        assert_eq!(entry.content, b"Source: foo\nVersion: 1.0-1\n");
        assert_eq!(entry.fetched_at.timestamp(), fetched_at.timestamp());
    }

    #[test]
    fn test_put_overwrites() {
        let (_dir, repo) = temp_repo();
        let url = Url::parse("https://lists.example.org/2008/01/maillist.html").unwrap();
        repo.put(&url, b"old index", Utc::now()).unwrap();
        repo.put(&url, b"new index", Utc::now()).unwrap();

        let entry = repo.get(&url).unwrap().unwrap();
        assert_eq!(entry.content, b"new index");
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cache.db");
        let url = Url::parse("https://lists.example.org/2008/01/msg00002.html").unwrap();

        {
            let repo = CacheRepository::new(&db_path).unwrap();
            repo.put(&url, b"message body", Utc::now()).unwrap();
        }

        let repo = CacheRepository::new(&db_path).unwrap();
        let entry = repo.get(&url).unwrap().unwrap();
        assert_eq!(entry.content, b"message body");
    }
}
