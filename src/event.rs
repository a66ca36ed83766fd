use tokio::sync::mpsc;

/// Connectivity edge events, one per state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
  BecameOnline,
  BecameOffline,
}

/// Stream of connectivity events for one subscriber
pub struct ConnectivityEvents {
  rx: mpsc::UnboundedReceiver<ConnectivityEvent>,
}

impl ConnectivityEvents {
  pub(crate) fn new(rx: mpsc::UnboundedReceiver<ConnectivityEvent>) -> Self {
    Self { rx }
  }

  /// Receive the next event. `None` once the monitor is gone.
  pub async fn next(&mut self) -> Option<ConnectivityEvent> {
    self.rx.recv().await
  }

  /// Take an already-delivered event without waiting.
  #[cfg(test)]
  pub fn try_next(&mut self) -> Option<ConnectivityEvent> {
    self.rx.try_recv().ok()
  }
}
