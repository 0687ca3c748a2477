//! SQLite-based cache storage
//!
//! One row per request identity; writes are upserts. Rows are returned
//! regardless of age because a stale row still carries the etag needed for
//! conditional revalidation. Freshness is the caller's call.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

type Result<T> = std::result::Result<T, CacheError>;

/// A cached response row
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub payload: Vec<u8>,
    pub etag: Option<String>,
    pub status: u16,
    pub fetched_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Whether this entry is still inside its freshness window
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true, // absurdly large TTL: treat as always fresh
        }
    }
}

/// SQLite-backed cache storage
pub struct CacheStorage {
    conn: Connection,
}

impl CacheStorage {
    /// Open or create cache storage at the default location (~/.evetrack)
    pub fn open() -> Result<Self> {
        let data_dir = Self::data_dir()?;
        Self::open_at(&data_dir)
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(CacheError::NoHome)?;
        Ok(home.join(".evetrack"))
    }

    /// Open cache storage at a specific directory (for testing)
    pub fn open_at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CacheError::Io(format!("Failed to create data dir: {}", e)))?;

        let db_path = dir.join("cache.db");
        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
            return Self::open_at(dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY NOT NULL,
                path TEXT NOT NULL,
                data BLOB NOT NULL,
                etag TEXT,
                status INTEGER NOT NULL,
                fetched_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_path ON cache_entries(path);
            CREATE INDEX IF NOT EXISTS idx_fetched_at ON cache_entries(fetched_at);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn })
    }

    /// Get the cached row for a key, fresh or stale
    pub fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let row: Option<(Vec<u8>, Option<String>, u16, i64)> = self
            .conn
            .query_row(
                "SELECT data, etag, status, fetched_at FROM cache_entries
                 WHERE cache_key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        Ok(row.map(|(payload, etag, status, fetched_at)| StoredEntry {
            payload,
            etag,
            status,
            fetched_at: DateTime::from_timestamp(fetched_at, 0).unwrap_or_else(Utc::now),
        }))
    }

    /// Upsert a full response for a key
    pub fn upsert(
        &self,
        key: &str,
        path: &str,
        payload: &[u8],
        etag: Option<&str>,
        status: u16,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (cache_key, path, data, etag, status, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key, path, payload, etag, status, fetched_at.timestamp()],
        )?;
        Ok(())
    }

    /// Advance fetched_at for a key without touching payload or etag.
    ///
    /// Used after a 304: the payload is still current, only the freshness
    /// window restarts.
    pub fn touch(&self, key: &str, fetched_at: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE cache_entries SET fetched_at = ?2 WHERE cache_key = ?1",
            params![key, fetched_at.timestamp()],
        )?;
        Ok(updated > 0)
    }

    /// Clear all cache entries, returning the number removed
    pub fn clear_all(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;

        self.conn.execute("DELETE FROM cache_entries", [])?;

        Ok(count as usize)
    }

    /// Get cache statistics
    pub fn stats(&self, ttl: Duration) -> Result<CacheStats> {
        let now = Utc::now().timestamp();
        let cutoff = now - ttl.as_secs() as i64;

        let total_entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;

        let fresh_entries: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE fetched_at > ?1",
            [cutoff],
            |r| r.get(0),
        )?;

        let total_size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM cache_entries",
            [],
            |r| r.get(0),
        )?;

        Ok(CacheStats {
            total_entries: total_entries as usize,
            fresh_entries: fresh_entries as usize,
            stale_entries: (total_entries - fresh_entries) as usize,
            total_size_bytes: total_size as usize,
        })
    }
}

/// Statistics about cache state
#[derive(Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub total_size_bytes: usize,
}
