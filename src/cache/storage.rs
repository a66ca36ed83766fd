//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::http::{Response, ResponseKind};

use super::traits::{CachedResponse, RequestKey};

/// Trait for cache storage backends.
///
/// Entries live in named partitions. Within a partition entries keep their
/// insertion order; putting an existing key replaces it at the newest position.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the partition if it does not exist yet.
  fn open_partition(&self, name: &str) -> Result<()>;

  /// All partition names, oldest first.
  fn partition_names(&self) -> Result<Vec<String>>;

  /// Delete a partition and everything in it. Returns whether it existed.
  fn delete_partition(&self, name: &str) -> Result<bool>;

  /// Store a response under `key`.
  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Find a response in one partition, or in any partition (oldest first) when `None`.
  fn match_key(&self, partition: Option<&str>, key: &RequestKey)
    -> Result<Option<CachedResponse>>;

  /// Keys of a partition in insertion order.
  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>>;

  /// Delete one entry. Returns whether it existed.
  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool>;

  /// Number of entries in a partition.
  fn len(&self, partition: &str) -> Result<usize>;
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named cache partitions
CREATE TABLE IF NOT EXISTS cache_partitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses; seq gives insertion order
CREATE TABLE IF NOT EXISTS cache_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    partition TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    kind TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (partition, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_partition
    ON cache_entries(partition, seq);
"#;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  /// Open the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Database::open(path, CACHE_SCHEMA)?,
    })
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self {
      db: Database::in_memory(CACHE_SCHEMA)?,
    })
  }
}

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, name: &str) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| Error::storage("failed to open cache partition", e))?;
    Ok(())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_partitions ORDER BY id")
      .map_err(|e| Error::storage("failed to prepare query", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| Error::storage("failed to list cache partitions", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| Error::storage("failed to list cache partitions", e))?;

    Ok(names)
  }

  fn delete_partition(&self, name: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| Error::storage("failed to begin transaction", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE partition = ?",
      params![name],
    )
    .map_err(|e| Error::storage("failed to delete cache entries", e))?;

    let removed = tx
      .execute("DELETE FROM cache_partitions WHERE name = ?", params![name])
      .map_err(|e| Error::storage("failed to delete cache partition", e))?;

    tx.commit()
      .map_err(|e| Error::storage("failed to commit transaction", e))?;

    Ok(removed > 0)
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let headers = serde_json::to_vec(&response.headers)
      .map_err(|e| Error::storage("failed to serialize headers", e))?;

    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| Error::storage("failed to begin transaction", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| Error::storage("failed to open cache partition", e))?;

    // Replace rather than upsert so the entry moves to the newest position
    tx.execute(
      "DELETE FROM cache_entries WHERE partition = ? AND request_hash = ?",
      params![partition, key.cache_hash()],
    )
    .map_err(|e| Error::storage("failed to replace cache entry", e))?;

    tx.execute(
      "INSERT INTO cache_entries
         (partition, request_hash, method, url, status, status_text, headers, body, kind, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        partition,
        key.cache_hash(),
        key.method,
        key.url,
        response.status,
        response.status_text,
        headers,
        response.body,
        kind_to_str(response.kind),
      ],
    )
    .map_err(|e| Error::storage("failed to store cache entry", e))?;

    tx.commit()
      .map_err(|e| Error::storage("failed to commit transaction", e))?;

    Ok(())
  }

  fn match_key(
    &self,
    partition: Option<&str>,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    // Partition order decides which copy wins when several exist
    let row: Option<(u16, String, Vec<u8>, Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body, e.kind, e.cached_at
         FROM cache_entries e
         INNER JOIN cache_partitions p ON p.name = e.partition
         WHERE e.request_hash = ?1 AND (?2 IS NULL OR e.partition = ?2)
         ORDER BY p.id
         LIMIT 1",
        params![key.cache_hash(), partition],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| Error::storage("failed to match cache entry", e))?;

    let Some((status, status_text, headers, body, kind, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_slice(&headers)
      .map_err(|e| Error::storage("failed to deserialize headers", e))?;

    Ok(Some(CachedResponse {
      response: Response {
        status,
        status_text,
        headers,
        body,
        kind: kind_from_str(&kind),
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT method, url FROM cache_entries WHERE partition = ? ORDER BY seq")
      .map_err(|e| Error::storage("failed to prepare query", e))?;

    let keys = stmt
      .query_map(params![partition], |row| {
        Ok(RequestKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| Error::storage("failed to list cache keys", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| Error::storage("failed to list cache keys", e))?;

    Ok(keys)
  }

  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let removed = self
      .db
      .conn()?
      .execute(
        "DELETE FROM cache_entries WHERE partition = ? AND request_hash = ?",
        params![partition, key.cache_hash()],
      )
      .map_err(|e| Error::storage("failed to delete cache entry", e))?;
    Ok(removed > 0)
  }

  fn len(&self, partition: &str) -> Result<usize> {
    let count: i64 = self
      .db
      .conn()?
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE partition = ?",
        params![partition],
        |row| row.get(0),
      )
      .map_err(|e| Error::storage("failed to count cache entries", e))?;
    Ok(count as usize)
  }
}

fn kind_to_str(kind: ResponseKind) -> &'static str {
  match kind {
    ResponseKind::Basic => "basic",
    ResponseKind::Cors => "cors",
    ResponseKind::Opaque => "opaque",
    ResponseKind::Error => "error",
  }
}

fn kind_from_str(kind: &str) -> ResponseKind {
  match kind {
    "basic" => ResponseKind::Basic,
    "cors" => ResponseKind::Cors,
    "opaque" => ResponseKind::Opaque,
    _ => ResponseKind::Error,
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::storage(&format!("failed to parse datetime '{}'", s), e))
}
