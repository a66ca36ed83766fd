//! In-memory ledger used by the tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::error::{Error, Result};

use super::{validate_id, NewRecord, Record, RemoteLedger, SnapshotListener, Subscription};

#[derive(Clone, Default)]
pub struct MemoryLedger {
  inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
  records: Mutex<Vec<Record>>,
  added: Mutex<Vec<NewRecord>>,
  /// Names whose add should fail
  reject: Mutex<Vec<String>>,
  offline: AtomicBool,
  calls: AtomicUsize,
  next_id: AtomicUsize,
  snapshots: Mutex<Option<watch::Sender<Vec<Record>>>>,
}

impl MemoryLedger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every add/delete fails with `RemoteWrite` while set.
  pub fn set_offline(&self, offline: bool) {
    self.inner.offline.store(offline, Ordering::SeqCst);
  }

  pub fn reject_name(&self, name: &str) {
    self.inner.reject.lock().unwrap().push(name.to_string());
  }

  /// Every add call, in call order, including rejected ones.
  pub fn added(&self) -> Vec<NewRecord> {
    self.inner.added.lock().unwrap().clone()
  }

  pub fn records(&self) -> Vec<Record> {
    self.inner.records.lock().unwrap().clone()
  }

  /// Number of add/delete calls that reached the ledger.
  pub fn calls(&self) -> usize {
    self.inner.calls.load(Ordering::SeqCst)
  }

  fn publish(&self) {
    let records = self.records();
    if let Some(tx) = self.inner.snapshots.lock().unwrap().as_ref() {
      let _ = tx.send(records);
    }
  }
}

#[async_trait]
impl RemoteLedger for MemoryLedger {
  fn subscribe(&self, on_change: SnapshotListener) -> Subscription {
    let mut rx = {
      let mut guard = self.inner.snapshots.lock().unwrap();
      let tx = guard.get_or_insert_with(|| watch::channel(Vec::new()).0);
      tx.send_replace(self.records());
      tx.subscribe()
    };

    Subscription::new(tokio::spawn(async move {
      loop {
        let snapshot = rx.borrow_and_update().clone();
        on_change(snapshot);
        if rx.changed().await.is_err() {
          break;
        }
      }
    }))
  }

  async fn add(&self, record: &NewRecord) -> Result<()> {
    self.inner.calls.fetch_add(1, Ordering::SeqCst);
    self.inner.added.lock().unwrap().push(record.clone());

    if self.inner.offline.load(Ordering::SeqCst) {
      return Err(Error::RemoteWrite("ledger unreachable".to_string()));
    }
    if self.inner.reject.lock().unwrap().contains(&record.name) {
      return Err(Error::RemoteWrite(format!("rejected {}", record.name)));
    }

    let id = format!("doc-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
    self.inner.records.lock().unwrap().push(Record {
      id,
      name: record.name.clone(),
      number: record.number.clone(),
    });
    self.publish();
    Ok(())
  }

  async fn delete(&self, id: &str) -> Result<()> {
    let id = validate_id(id)?;
    self.inner.calls.fetch_add(1, Ordering::SeqCst);

    if self.inner.offline.load(Ordering::SeqCst) {
      return Err(Error::RemoteWrite("ledger unreachable".to_string()));
    }

    self.inner.records.lock().unwrap().retain(|r| r.id != id);
    self.publish();
    Ok(())
  }
}
