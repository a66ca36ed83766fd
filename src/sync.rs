//! Replays queued offline creates against the remote ledger.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::event::{ConnectivityEvent, ConnectivityEvents};
use crate::ledger::RemoteLedger;
use crate::queue::MutationQueue;

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
  pub attempted: usize,
  pub synced: usize,
  pub failed: usize,
}

/// Moves pending creates from the mutation queue to the ledger.
pub struct Reconciler {
  queue: Arc<dyn MutationQueue>,
  ledger: Arc<dyn RemoteLedger>,
  /// Serializes cycles so a drain never interleaves with another clear
  running: Mutex<()>,
}

impl Reconciler {
  pub fn new(queue: Arc<dyn MutationQueue>, ledger: Arc<dyn RemoteLedger>) -> Self {
    Self {
      queue,
      ledger,
      running: Mutex::new(()),
    }
  }

  /// Run one cycle.
  ///
  /// 1. Read every pending create
  /// 2. Attempt each one exactly once, in queue order; failures are logged
  ///    and do not stop the batch
  /// 3. Clear the queue, whatever the individual outcomes
  ///
  /// A failed item is dropped by step 3. The queue keeps no retry state,
  /// so this is the price of never replaying a batch twice.
  pub async fn reconcile(&self) -> ReconcileReport {
    let _running = self.running.lock().await;
    let mut report = ReconcileReport::default();

    let pending = match self.queue.drain_all() {
      Ok(pending) => pending,
      Err(e) => {
        error!("[Sync] Could not read pending records: {}", e);
        return report;
      }
    };

    if pending.is_empty() {
      return report;
    }

    info!("[Sync] Found {} pending records to sync", pending.len());

    for mutation in &pending {
      report.attempted += 1;
      match self.ledger.add(&mutation.record()).await {
        Ok(()) => {
          report.synced += 1;
          info!("[Sync] Record synced (local key {})", mutation.local_key);
        }
        Err(e) => {
          report.failed += 1;
          warn!("[Sync] Error syncing record {}: {}", mutation.local_key, e);
        }
      }
    }

    if let Err(e) = self.queue.clear_all() {
      error!("[Sync] Could not clear pending records: {}", e);
    }

    info!(
      "[Sync] Reconciliation done: {} synced, {} failed",
      report.synced, report.failed
    );
    report
  }

  /// Reconcile on every `BecameOnline` until the event stream ends.
  pub async fn run(self: Arc<Self>, mut events: ConnectivityEvents) {
    while let Some(event) = events.next().await {
      if event == ConnectivityEvent::BecameOnline {
        self.reconcile().await;
      }
    }
  }
}
