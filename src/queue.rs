//! Durable queue of record creates made while offline.
//!
//! Each pending create gets a queue-local auto-increment key. Keys are
//! never reused, even after the queue is cleared. The queue is drained
//! and cleared as a whole batch by the reconciler.

use rusqlite::params;
use std::path::Path;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::ledger::NewRecord;

/// A create that has not reached the remote ledger yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMutation {
  pub local_key: i64,
  pub name: String,
  pub number: String,
}

impl QueuedMutation {
  pub fn record(&self) -> NewRecord {
    NewRecord {
      name: self.name.clone(),
      number: self.number.clone(),
    }
  }
}

/// Trait for mutation queue backends.
pub trait MutationQueue: Send + Sync {
  /// Persist one pending create and return its local key.
  fn enqueue(&self, record: &NewRecord) -> Result<i64>;

  /// All pending creates in insertion order, without removing them.
  fn drain_all(&self) -> Result<Vec<QueuedMutation>>;

  /// Remove every pending create.
  fn clear_all(&self) -> Result<()>;

  /// Remove a single pending create. Returns whether it existed.
  fn remove_one(&self, local_key: i64) -> Result<bool>;

  /// Number of pending creates.
  fn len(&self) -> Result<usize>;

  fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_records (
    local_key INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    number TEXT NOT NULL
);
"#;

/// SQLite-backed mutation queue.
pub struct SqliteQueue {
  db: Database,
}

impl SqliteQueue {
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Database::open(path, QUEUE_SCHEMA)?,
    })
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self {
      db: Database::in_memory(QUEUE_SCHEMA)?,
    })
  }
}

impl MutationQueue for SqliteQueue {
  fn enqueue(&self, record: &NewRecord) -> Result<i64> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT INTO pending_records (name, number) VALUES (?, ?)",
        params![record.name, record.number],
      )
      .map_err(|e| Error::storage("failed to queue record", e))?;
    Ok(conn.last_insert_rowid())
  }

  fn drain_all(&self) -> Result<Vec<QueuedMutation>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT local_key, name, number FROM pending_records ORDER BY local_key")
      .map_err(|e| Error::storage("failed to prepare queue read", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok(QueuedMutation {
          local_key: row.get(0)?,
          name: row.get(1)?,
          number: row.get(2)?,
        })
      })
      .map_err(|e| Error::storage("failed to read queue", e))?;

    let pending = rows
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| Error::storage("failed to read queue", e))?;

    Ok(pending)
  }

  fn clear_all(&self) -> Result<()> {
    self
      .db
      .conn()?
      .execute("DELETE FROM pending_records", [])
      .map_err(|e| Error::storage("failed to clear queue", e))?;
    Ok(())
  }

  fn remove_one(&self, local_key: i64) -> Result<bool> {
    let removed = self
      .db
      .conn()?
      .execute(
        "DELETE FROM pending_records WHERE local_key = ?",
        params![local_key],
      )
      .map_err(|e| Error::storage("failed to remove queued record", e))?;
    Ok(removed > 0)
  }

  fn len(&self) -> Result<usize> {
    let count: i64 = self
      .db
      .conn()?
      .query_row("SELECT COUNT(*) FROM pending_records", [], |row| row.get(0))
      .map_err(|e| Error::storage("failed to count queue", e))?;
    Ok(count as usize)
  }
}

/// Queue whose backing store is unavailable. Counts clear attempts.
#[cfg(test)]
#[derive(Default)]
pub struct UnavailableQueue {
  pub clears: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MutationQueue for UnavailableQueue {
  fn enqueue(&self, _record: &NewRecord) -> Result<i64> {
    Err(Error::storage("failed to queue record", "disk full"))
  }

  fn drain_all(&self) -> Result<Vec<QueuedMutation>> {
    Err(Error::storage("failed to read pending records", "disk I/O error"))
  }

  fn clear_all(&self) -> Result<()> {
    self.clears.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    Err(Error::storage("failed to clear pending records", "disk I/O error"))
  }

  fn remove_one(&self, _local_key: i64) -> Result<bool> {
    Err(Error::storage("failed to remove pending record", "disk I/O error"))
  }

  fn len(&self) -> Result<usize> {
    Err(Error::storage("failed to count pending records", "disk I/O error"))
  }
}
