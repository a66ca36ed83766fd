//! Remote ledger: the authoritative, network-side record store.
//!
//! The core only needs three things from it: a live snapshot feed, an
//! append, and a delete by id. [`FirestoreLedger`] talks to the Firestore
//! REST API; an in-memory ledger backs the tests.

mod api_types;
mod firestore;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

pub use firestore::FirestoreLedger;

/// A record as stored by the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  pub id: String,
  pub name: String,
  pub number: String,
}

/// A record that has not been assigned a remote id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
  pub name: String,
  pub number: String,
}

impl NewRecord {
  /// Build a record from user input, trimming both fields.
  pub fn new(name: &str, number: &str) -> Result<Self> {
    let name = name.trim();
    let number = number.trim();
    if name.is_empty() || number.is_empty() {
      return Err(Error::InvalidArgument(
        "name and number are both required".to_string(),
      ));
    }
    Ok(Self {
      name: name.to_string(),
      number: number.to_string(),
    })
  }
}

/// Trim a record id, rejecting blank ones and anything that is not a
/// single path segment.
pub fn validate_id(id: &str) -> Result<&str> {
  let id = id.trim();
  if id.is_empty() {
    return Err(Error::InvalidArgument("record id cannot be empty".to_string()));
  }
  if id.contains('/') || id == "." || id == ".." {
    return Err(Error::InvalidArgument(format!("invalid record id: {}", id)));
  }
  Ok(id)
}

/// Callback receiving every new snapshot of the record set.
pub type SnapshotListener = Box<dyn Fn(Vec<Record>) + Send + Sync>;

/// Handle for a live subscription. Dropping it unsubscribes.
pub struct Subscription {
  task: Option<JoinHandle<()>>,
}

impl Subscription {
  pub fn new(task: JoinHandle<()>) -> Self {
    Self { task: Some(task) }
  }

  pub fn unsubscribe(mut self) {
    self.stop();
  }

  fn stop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.stop();
  }
}

/// Operations the core consumes from the remote ledger.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
  /// Deliver the current record set now and again on every change.
  fn subscribe(&self, on_change: SnapshotListener) -> Subscription;

  /// Append a record; the ledger assigns its id.
  async fn add(&self, record: &NewRecord) -> Result<()>;

  /// Delete a record by id. Blank or path-like ids fail with `InvalidArgument`
  /// before any network call.
  async fn delete(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_record_trims_fields() {
    let record = NewRecord::new("  Aysel ", " +994501112233\n").unwrap();
    assert_eq!(record.name, "Aysel");
    assert_eq!(record.number, "+994501112233");
  }

  #[test]
  fn test_new_record_rejects_blank_fields() {
    assert!(matches!(
      NewRecord::new("Aysel", "   "),
      Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
      NewRecord::new("", "+994"),
      Err(Error::InvalidArgument(_))
    ));
  }

  #[test]
  fn test_validate_id() {
    assert_eq!(validate_id("  abc123 ").unwrap(), "abc123");
    assert!(matches!(validate_id(" \t "), Err(Error::InvalidArgument(_))));
  }

  #[test]
  fn test_validate_id_rejects_paths() {
    for id in ["../users/admin", "a/b", "/abc", "..", "."] {
      assert!(
        matches!(validate_id(id), Err(Error::InvalidArgument(_))),
        "{}",
        id
      );
    }
    assert_eq!(validate_id("doc-1?x#y").unwrap(), "doc-1?x#y");
  }
}
