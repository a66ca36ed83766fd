use color_eyre::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, PartitionNames, SqliteStorage};
use crate::config::Config;
use crate::connectivity::{spawn_probe, ConnectivityMonitor, ConnectivityProbe, TcpProbe};
use crate::error::Error;
use crate::event::{ConnectivityEvent, ConnectivityEvents};
use crate::http::{Request, Response};
use crate::ledger::{FirestoreLedger, Record};
use crate::queue::{QueuedMutation, SqliteQueue};
use crate::records::{AddOutcome, RecordService, WakeupRequester};
use crate::sync::{ReconcileReport, Reconciler};
use crate::worker::{HttpNetwork, ShellWorker, WorkerEvent, WorkerMessage, WorkerOutcome};

/// Sync tags requested while offline, delivered on the next online edge.
#[derive(Default)]
pub struct PendingWakeups {
  tags: Mutex<Vec<String>>,
}

impl PendingWakeups {
  pub fn take(&self) -> Vec<String> {
    let mut tags = self.tags.lock().unwrap_or_else(|e| e.into_inner());
    std::mem::take(&mut *tags)
  }
}

impl WakeupRequester for PendingWakeups {
  fn request_wakeup(&self, tag: &str) {
    let mut tags = self.tags.lock().unwrap_or_else(|e| e.into_inner());
    if !tags.iter().any(|t| t == tag) {
      debug!("Wake-up requested for {}", tag);
      tags.push(tag.to_string());
    }
  }
}

/// Deliver pending wake-ups to the worker on every online edge.
pub async fn forward_wakeups(
  mut events: ConnectivityEvents,
  wakeups: Arc<PendingWakeups>,
  worker: Arc<ShellWorker<SqliteStorage>>,
  reconciler: Arc<Reconciler>,
) {
  while let Some(event) = events.next().await {
    if event != ConnectivityEvent::BecameOnline {
      continue;
    }
    for tag in wakeups.take() {
      let outcome = worker.dispatch(WorkerEvent::Sync { tag }).await;
      if let WorkerOutcome::SyncAcknowledged { .. } = outcome {
        reconciler.reconcile().await;
      }
    }
  }
}

/// Wired-up application
pub struct App {
  config: Config,
  offline: bool,
  monitor: ConnectivityMonitor,
  ledger: Arc<FirestoreLedger>,
  records: RecordService,
  reconciler: Arc<Reconciler>,
  worker: Arc<ShellWorker<SqliteStorage>>,
  wakeups: Arc<PendingWakeups>,
  probe: Arc<dyn ConnectivityProbe>,
}

impl App {
  /// Open local stores and build every component. With `offline` the
  /// network is never probed and the monitor stays offline.
  pub async fn new(config: Config, offline: bool) -> Result<Self> {
    let data_dir = config.storage.resolve_data_dir()?;

    let queue = Arc::new(SqliteQueue::open(&data_dir.join("queue.db"))?);
    let storage = SqliteStorage::open(&data_dir.join("cache.db"))?;

    let probe: Arc<dyn ConnectivityProbe> = Arc::new(TcpProbe::new(
      &config.connectivity.probe_addr,
      Duration::from_millis(config.connectivity.probe_timeout_ms),
    ));
    let online = !offline && probe.probe().await;
    let monitor = ConnectivityMonitor::new(online);

    let ledger = Arc::new(FirestoreLedger::new(&config.ledger)?);
    let wakeups = Arc::new(PendingWakeups::default());
    let records = RecordService::new(ledger.clone(), queue.clone(), monitor.clone())
      .with_wakeup(wakeups.clone());
    let reconciler = Arc::new(Reconciler::new(queue, ledger.clone()));

    let cache = CacheLayer::new(
      storage,
      PartitionNames {
        static_name: config.cache.static_name.clone(),
        dynamic_name: config.cache.dynamic_name.clone(),
      },
      config.cache.max_dynamic_entries,
    );
    let network = Arc::new(HttpNetwork::new(&config.shell.origin)?);
    let worker = Arc::new(ShellWorker::new(cache, network, &config.shell));

    Ok(Self {
      config,
      offline,
      monitor,
      ledger,
      records,
      reconciler,
      worker,
      wakeups,
      probe,
    })
  }

  pub fn is_online(&self) -> bool {
    self.monitor.is_online()
  }

  /// Run until ctrl-c: install and activate the shell, watch the ledger,
  /// and reconcile whenever the network comes back.
  pub async fn run(&self) -> Result<()> {
    self.install().await;
    if self.worker.skip_waiting_requested() {
      self.activate().await;
    } else {
      info!("New shell installed, waiting for skip-waiting to activate");
    }

    match self.records.has_pending() {
      Ok(true) => info!("Contacts saved offline are waiting to sync"),
      Ok(false) => {}
      Err(e) => warn!("Could not read pending contacts: {}", e),
    }

    let mut tasks = Vec::new();
    if !self.offline {
      tasks.push(spawn_probe(
        self.monitor.clone(),
        self.probe.clone(),
        Duration::from_secs(self.config.connectivity.probe_interval_secs.max(1)),
      ));
    }
    tasks.push(tokio::spawn(
      self.reconciler.clone().run(self.monitor.subscribe()),
    ));
    tasks.push(tokio::spawn(forward_wakeups(
      self.monitor.subscribe(),
      self.wakeups.clone(),
      self.worker.clone(),
      self.reconciler.clone(),
    )));

    let subscription = self.records.watch(Box::new(|records| {
      println!("--- {} contacts ---", records.len());
      for record in &records {
        print_record(record);
      }
    }));

    info!("Running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    subscription.unsubscribe();
    for task in tasks {
      task.abort();
    }
    self.worker.cache().settle().await;
    Ok(())
  }

  pub async fn add(&self, name: &str, number: &str) -> crate::error::Result<AddOutcome> {
    self.records.add(name, number).await
  }

  pub async fn delete(&self, id: &str) -> crate::error::Result<()> {
    self.records.delete(id).await
  }

  pub async fn list(&self) -> crate::error::Result<Vec<Record>> {
    if !self.is_online() {
      return Err(Error::NetworkUnavailable("cannot list records offline".to_string()));
    }
    self.ledger.list().await
  }

  pub fn pending(&self) -> crate::error::Result<Vec<QueuedMutation>> {
    self.records.pending()
  }

  pub fn pending_count(&self) -> crate::error::Result<usize> {
    self.records.pending_count()
  }

  pub fn drop_pending(&self, local_key: i64) -> crate::error::Result<bool> {
    self.records.discard_pending(local_key)
  }

  pub async fn sync(&self) -> crate::error::Result<ReconcileReport> {
    if !self.is_online() {
      return Err(Error::NetworkUnavailable("cannot sync offline".to_string()));
    }
    Ok(self.reconciler.reconcile().await)
  }

  /// Route one request through the shell worker.
  pub async fn fetch(&self, url: &str, method: &str, navigate: bool) -> Response {
    let request = if navigate {
      Request::navigate(url)
    } else {
      Request::get(url)
    }
    .with_method(method);

    let outcome = self.worker.dispatch(WorkerEvent::Fetch(request)).await;
    self.worker.cache().settle().await;
    match outcome {
      WorkerOutcome::Respond(response) => response,
      other => {
        warn!("Fetch produced no response: {:?}", other);
        Response::network_error()
      }
    }
  }

  pub async fn install(&self) -> WorkerOutcome {
    self.worker.dispatch(WorkerEvent::Install).await
  }

  pub async fn activate(&self) -> WorkerOutcome {
    let outcome = self.worker.dispatch(WorkerEvent::Activate).await;
    if self.worker.controls_clients() {
      debug!("Shell now controls its clients");
    }
    outcome
  }

  /// Deliver the skip-waiting message and activate straight away.
  pub async fn skip_waiting(&self) -> WorkerOutcome {
    let message = WorkerEvent::Message(WorkerMessage::SkipWaiting);
    self.worker.dispatch(message).await;
    self.activate().await
  }
}

pub fn print_record(record: &Record) {
  println!("{:<24} {:<24} {}", record.id, record.name, record.number);
}
