//! Online/offline detection.
//!
//! [`ConnectivityMonitor`] holds the single connectivity state of the
//! process. The platform signal is fed in through [`ConnectivityMonitor::set_online`],
//! either by a caller or by the probe task from [`spawn_probe`]. Subscribers
//! get one event per real transition, never one per poll.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{ConnectivityEvent, ConnectivityEvents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
  Online,
  Offline,
}

impl ConnectivityState {
  fn from_online(online: bool) -> Self {
    if online {
      ConnectivityState::Online
    } else {
      ConnectivityState::Offline
    }
  }
}

struct MonitorState {
  state: ConnectivityState,
  subscribers: Vec<mpsc::UnboundedSender<ConnectivityEvent>>,
}

/// Shared handle to the connectivity state. Clones observe the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
  inner: Arc<Mutex<MonitorState>>,
}

impl ConnectivityMonitor {
  /// Create a monitor initialized from the platform's current signal.
  pub fn new(online: bool) -> Self {
    Self {
      inner: Arc::new(Mutex::new(MonitorState {
        state: ConnectivityState::from_online(online),
        subscribers: Vec::new(),
      })),
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
    // Every write under the lock is a single assignment, so a poisoned state is still valid
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn state(&self) -> ConnectivityState {
    self.lock().state
  }

  pub fn is_online(&self) -> bool {
    self.state() == ConnectivityState::Online
  }

  /// Apply the platform signal. Returns the event fired, if the state changed.
  pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
    let mut inner = self.lock();
    let next = ConnectivityState::from_online(online);
    if inner.state == next {
      return None;
    }
    inner.state = next;

    let event = match next {
      ConnectivityState::Online => ConnectivityEvent::BecameOnline,
      ConnectivityState::Offline => ConnectivityEvent::BecameOffline,
    };

    match event {
      ConnectivityEvent::BecameOnline => info!("Network: online"),
      ConnectivityEvent::BecameOffline => warn!("Network: offline"),
    }

    // Drop subscribers whose receiver is gone
    inner.subscribers.retain(|tx| tx.send(event).is_ok());
    Some(event)
  }

  /// Subscribe to edge events.
  ///
  /// When already online the stream starts with a synthetic
  /// `BecameOnline`, so startup work runs without a live transition.
  pub fn subscribe(&self) -> ConnectivityEvents {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut inner = self.lock();
    if inner.state == ConnectivityState::Online {
      let _ = tx.send(ConnectivityEvent::BecameOnline);
    }
    inner.subscribers.push(tx);
    ConnectivityEvents::new(rx)
  }
}

/// Source of the platform's "is the network reachable" signal.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
  async fn probe(&self) -> bool;
}

/// Probe that opens a TCP connection to a known host.
pub struct TcpProbe {
  addr: String,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(addr: &str, timeout: Duration) -> Self {
    Self {
      addr: addr.to_string(),
      timeout,
    }
  }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
  async fn probe(&self) -> bool {
    match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&self.addr)).await {
      Ok(Ok(_)) => true,
      Ok(Err(e)) => {
        debug!("Probe {} failed: {}", self.addr, e);
        false
      }
      Err(_) => {
        debug!("Probe {} timed out", self.addr);
        false
      }
    }
  }
}

/// Poll `probe` every `interval` and feed the result into `monitor`.
pub fn spawn_probe(
  monitor: ConnectivityMonitor,
  probe: Arc<dyn ConnectivityProbe>,
  interval: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut timer = tokio::time::interval(interval);
    loop {
      timer.tick().await;
      let online = probe.probe().await;
      monitor.set_online(online);
    }
  })
}
