//! SQLite-backed cache row storage.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// One persisted cache row. At most one live row exists per
/// (creator, key); writes replace in place.
#[derive(Debug, Clone)]
pub struct CacheRow {
    /// Namespace owning the row, one per integration service.
    pub creator: String,
    /// Content digest of the serialized key parameters.
    pub key: String,
    /// The cached value, serialized as JSON.
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub total_size_bytes: u64,
    /// Per-namespace breakdown, sorted descending by entry count.
    pub creators: Vec<CreatorStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatorStats {
    pub creator: String,
    pub count: usize,
    pub size_bytes: u64,
}

/// Row metadata for the admin surface, without the payload.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub creator: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub expired: bool,
}

/// Row-level cache storage operations.
pub trait CacheStore: Send + Sync {
    /// A non-expired row for (creator, key), if one exists.
    fn get_fresh(
        &self,
        creator: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheRow>>;

    /// Insert or replace the row for (creator, key).
    fn upsert(&self, row: &CacheRow) -> Result<()>;

    /// Raise the expiry of (creator, key) to `at_least` if it is lower.
    fn bump_expiry(&self, creator: &str, key: &str, at_least: DateTime<Utc>) -> Result<()>;

    /// Delete every row. Returns the number removed.
    fn delete_all(&self) -> Result<usize>;

    /// Delete every row owned by `creator`. Returns the number removed.
    fn delete_by_creator(&self, creator: &str) -> Result<usize>;

    /// Delete rows whose expiry lies strictly before `now`.
    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    fn statistics(&self, now: DateTime<Utc>) -> Result<CacheStatistics>;

    /// Newest-expiring rows first, at most `limit` of them.
    fn entries(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<CacheEntryInfo>>;
}

/// SQLite-backed cache store.
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    creator    TEXT NOT NULL,
    key        TEXT NOT NULL,
    data       TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (creator, key)
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries (expires_at);
";

impl SqliteCacheStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            Connection::open(db_path.as_ref()).context("Failed to open cache database")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on cache database")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create cache schema")?;

        let count: usize =
            conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;
        info!("Cache store ready: {} entries", count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

// Expiry timestamps are stored with millisecond precision; integration
// TTLs can be as short as a second.
fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

impl CacheStore for SqliteCacheStore {
    fn get_fresh(
        &self,
        creator: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT data, created_at, expires_at FROM cache_entries
                 WHERE creator = ?1 AND key = ?2 AND expires_at > ?3",
                params![creator, key, to_millis(now)],
                |r| {
                    Ok(CacheRow {
                        creator: creator.to_string(),
                        key: key.to_string(),
                        data: r.get(0)?,
                        created_at: from_millis(r.get(1)?),
                        expires_at: from_millis(r.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn upsert(&self, row: &CacheRow) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cache_entries (creator, key, data, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(creator, key) DO UPDATE SET
                 data = excluded.data,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
            params![
                row.creator,
                row.key,
                row.data,
                to_millis(row.created_at),
                to_millis(row.expires_at)
            ],
        )?;
        Ok(())
    }

    fn bump_expiry(&self, creator: &str, key: &str, at_least: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE cache_entries SET expires_at = ?3
             WHERE creator = ?1 AND key = ?2 AND expires_at < ?3",
            params![creator, key, to_millis(at_least)],
        )?;
        Ok(())
    }

    fn delete_all(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM cache_entries", [])?;
        Ok(deleted)
    }

    fn delete_by_creator(&self, creator: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE creator = ?1",
            params![creator],
        )?;
        Ok(deleted)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at < ?1",
            params![to_millis(now)],
        )?;
        Ok(deleted)
    }

    fn statistics(&self, now: DateTime<Utc>) -> Result<CacheStatistics> {
        let conn = self.conn.lock().unwrap();
        let now_ms = to_millis(now);

        let total_entries: usize =
            conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;
        let expired_entries: usize = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at < ?1",
            params![now_ms],
            |r| r.get(0),
        )?;
        let total_size_bytes: u64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM cache_entries",
            [],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT creator, COUNT(*), COALESCE(SUM(LENGTH(data)), 0)
             FROM cache_entries
             GROUP BY creator
             ORDER BY COUNT(*) DESC, creator",
        )?;
        let creators = stmt
            .query_map([], |r| {
                Ok(CreatorStats {
                    creator: r.get(0)?,
                    count: r.get(1)?,
                    size_bytes: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CacheStatistics {
            total_entries,
            expired_entries,
            active_entries: total_entries - expired_entries,
            total_size_bytes,
            creators,
        })
    }

    fn entries(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<CacheEntryInfo>> {
        let conn = self.conn.lock().unwrap();
        let now_ms = to_millis(now);
        let mut stmt = conn.prepare(
            "SELECT creator, key, created_at, expires_at, LENGTH(data)
             FROM cache_entries
             ORDER BY expires_at DESC, creator, key
             LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |r| {
                let expires_ms: i64 = r.get(3)?;
                Ok(CacheEntryInfo {
                    creator: r.get(0)?,
                    key: r.get(1)?,
                    created_at: from_millis(r.get(2)?),
                    expires_at: from_millis(expires_ms),
                    size_bytes: r.get(4)?,
                    expired: expires_ms < now_ms,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
