use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// SQLite connection shared by the mutation queue and the request cache.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create a database file and apply `schema`.
  pub fn open(path: &Path, schema: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage("failed to create database directory", e))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::storage(
        &format!("failed to open database at {}", path.display()),
        e,
      )
    })?;

    Self::with_connection(conn, schema)
  }

  /// Open a private in-memory database.
  pub fn in_memory(schema: &str) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| Error::storage("failed to open database", e))?;
    Self::with_connection(conn, schema)
  }

  fn with_connection(conn: Connection, schema: &str) -> Result<Self> {
    conn
      .execute_batch(schema)
      .map_err(|e| Error::storage("failed to run migrations", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Lock the connection for a single operation.
  pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage("lock poisoned", e))
  }

  /// Default data directory, `$XDG_DATA_HOME/postgram`.
  pub fn default_dir() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("postgram"))
  }
}
