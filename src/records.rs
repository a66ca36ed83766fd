//! The mutation path used by the front end.
//!
//! Online, writes go straight to the remote ledger. Offline, creates are
//! queued locally and a background-sync wake-up is requested. The record
//! list shown to the user is always the ledger's own snapshot.

use std::sync::Arc;
use tracing::{info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::ledger::{validate_id, NewRecord, RemoteLedger, SnapshotListener, Subscription};
use crate::queue::{MutationQueue, QueuedMutation};

/// Tag used for the background-sync registration.
pub const SYNC_TAG: &str = "sync-contacts";

/// Host hook for "wake me when online". Best-effort only.
pub trait WakeupRequester: Send + Sync {
  fn request_wakeup(&self, tag: &str);
}

/// Where an added record went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
  /// Written to the remote ledger
  Saved,
  /// Stored in the offline queue under this key
  Queued { local_key: i64 },
}

pub struct RecordService {
  ledger: Arc<dyn RemoteLedger>,
  queue: Arc<dyn MutationQueue>,
  monitor: ConnectivityMonitor,
  wakeup: Option<Arc<dyn WakeupRequester>>,
}

impl RecordService {
  pub fn new(
    ledger: Arc<dyn RemoteLedger>,
    queue: Arc<dyn MutationQueue>,
    monitor: ConnectivityMonitor,
  ) -> Self {
    Self {
      ledger,
      queue,
      monitor,
      wakeup: None,
    }
  }

  pub fn with_wakeup(mut self, wakeup: Arc<dyn WakeupRequester>) -> Self {
    self.wakeup = Some(wakeup);
    self
  }

  /// Add a record from raw user input.
  pub async fn add(&self, name: &str, number: &str) -> Result<AddOutcome> {
    let record = NewRecord::new(name, number)?;

    if !self.monitor.is_online() {
      let local_key = self.queue.enqueue(&record)?;
      info!("Saved offline (local key {}), will sync when online", local_key);

      if let Some(wakeup) = &self.wakeup {
        wakeup.request_wakeup(SYNC_TAG);
      }
      return Ok(AddOutcome::Queued { local_key });
    }

    self.ledger.add(&record).await?;
    Ok(AddOutcome::Saved)
  }

  /// Delete a synced record by its remote id.
  ///
  /// Deletes are never queued: while offline this fails with
  /// `NetworkUnavailable` and nothing is touched.
  pub async fn delete(&self, id: &str) -> Result<()> {
    let id = validate_id(id)?;

    if !self.monitor.is_online() {
      warn!("Refusing to delete {} while offline", id);
      return Err(Error::NetworkUnavailable(
        "records can only be deleted while online".to_string(),
      ));
    }

    self.ledger.delete(id).await
  }

  /// Pending offline creates, oldest first.
  pub fn pending(&self) -> Result<Vec<QueuedMutation>> {
    self.queue.drain_all()
  }

  /// Number of creates waiting to sync.
  pub fn pending_count(&self) -> Result<usize> {
    self.queue.len()
  }

  pub fn has_pending(&self) -> Result<bool> {
    Ok(!self.queue.is_empty()?)
  }

  /// Drop a pending create before it is synced.
  pub fn discard_pending(&self, local_key: i64) -> Result<bool> {
    self.queue.remove_one(local_key)
  }

  /// Watch the visible record list.
  pub fn watch(&self, on_change: SnapshotListener) -> Subscription {
    self.ledger.subscribe(on_change)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ledger::memory::MemoryLedger;
  use crate::queue::{SqliteQueue, UnavailableQueue};
  use crate::sync::Reconciler;
  use std::sync::Mutex;
  use tokio::sync::mpsc;

  #[derive(Default)]
  struct RecordingWakeup(Mutex<Vec<String>>);

  impl WakeupRequester for RecordingWakeup {
    fn request_wakeup(&self, tag: &str) {
      self.0.lock().unwrap().push(tag.to_string());
    }
  }

  struct Harness {
    ledger: MemoryLedger,
    queue: Arc<SqliteQueue>,
    monitor: ConnectivityMonitor,
    wakeup: Arc<RecordingWakeup>,
    service: RecordService,
  }

  fn harness(online: bool) -> Harness {
    let ledger = MemoryLedger::new();
    let queue = Arc::new(SqliteQueue::in_memory().unwrap());
    let monitor = ConnectivityMonitor::new(online);
    let wakeup = Arc::new(RecordingWakeup::default());
    let service = RecordService::new(Arc::new(ledger.clone()), queue.clone(), monitor.clone())
      .with_wakeup(wakeup.clone());
    Harness {
      ledger,
      queue,
      monitor,
      wakeup,
      service,
    }
  }

  #[tokio::test]
  async fn test_offline_add_is_queued_and_synced_on_reconnect() {
    let h = harness(false);

    let outcome = h.service.add("Aysel", "+994501112233").await.unwrap();
    assert!(matches!(outcome, AddOutcome::Queued { .. }));

    let pending = h.queue.drain_all().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "Aysel");
    assert_eq!(pending[0].number, "+994501112233");
    assert_eq!(h.ledger.calls(), 0);
    assert_eq!(*h.wakeup.0.lock().unwrap(), vec![SYNC_TAG.to_string()]);

    let reconciler = Arc::new(Reconciler::new(h.queue.clone(), Arc::new(h.ledger.clone())));
    let task = tokio::spawn(reconciler.run(h.monitor.subscribe()));
    h.monitor.set_online(true);

    while !h.queue.is_empty().unwrap() {
      tokio::task::yield_now().await;
    }
    assert_eq!(
      h.ledger.added(),
      vec![NewRecord::new("Aysel", "+994501112233").unwrap()]
    );
    task.abort();
  }

  #[tokio::test]
  async fn test_offline_queue_failure_reaches_caller() {
    let ledger = MemoryLedger::new();
    let wakeup = Arc::new(RecordingWakeup::default());
    let service = RecordService::new(
      Arc::new(ledger.clone()),
      Arc::new(UnavailableQueue::default()),
      ConnectivityMonitor::new(false),
    )
    .with_wakeup(wakeup.clone());

    let err = service.add("Aysel", "+994501112233").await.unwrap_err();

    assert!(matches!(err, Error::StorageUnavailable(_)));
    assert!(err.user_message().contains("NOT queued"));
    assert_eq!(ledger.calls(), 0);
    assert!(wakeup.0.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_online_add_goes_to_ledger() {
    let h = harness(true);
    assert_eq!(
      h.service.add(" Aysel ", "+994501112233").await.unwrap(),
      AddOutcome::Saved
    );
    assert_eq!(h.ledger.records()[0].name, "Aysel");
    assert!(h.queue.is_empty().unwrap());
    assert!(h.wakeup.0.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_online_add_failure_is_surfaced() {
    let h = harness(true);
    h.ledger.set_offline(true);

    let err = h.service.add("Aysel", "+994").await.unwrap_err();
    assert!(matches!(err, Error::RemoteWrite(_)));
    // Not silently queued
    assert!(h.queue.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_blank_fields_fail_before_any_io() {
    let h = harness(false);
    let err = h.service.add("  ", "+994").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(h.queue.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_blank_delete_fails_without_calls() {
    let h = harness(true);
    let err = h.service.delete("   ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(h.ledger.calls(), 0);
  }

  #[tokio::test]
  async fn test_delete_online_and_offline() {
    let h = harness(true);
    h.service.add("Aysel", "+994").await.unwrap();
    let id = h.ledger.records()[0].id.clone();

    h.monitor.set_online(false);
    let err = h.service.delete(&id).await.unwrap_err();
    assert!(matches!(err, Error::NetworkUnavailable(_)));
    assert_eq!(h.ledger.records().len(), 1);

    h.monitor.set_online(true);
    h.service.delete(&format!(" {} ", id)).await.unwrap();
    assert!(h.ledger.records().is_empty());
  }

  #[tokio::test]
  async fn test_discard_pending() {
    let h = harness(false);
    let AddOutcome::Queued { local_key } = h.service.add("Aysel", "+994").await.unwrap() else {
      panic!("expected queued outcome");
    };

    assert!(h.service.discard_pending(local_key).unwrap());
    assert!(h.service.pending().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_watch_shows_ledger_snapshot_only() {
    let h = harness(true);
    h.service.add("Synced", "+1").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = h.service.watch(Box::new(move |records| {
      let _ = tx.send(records);
    }));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.len(), 1);

    // Queued records are not merged into the visible list
    h.monitor.set_online(false);
    h.service.add("Queued", "+2").await.unwrap();
    h.monitor.set_online(true);
    h.service.add("Second", "+3").await.unwrap();

    let next = rx.recv().await.unwrap();
    let names: Vec<_> = next.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["Synced", "Second"]);

    sub.unsubscribe();
  }
}
