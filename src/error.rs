//! Error taxonomy shared by the queue, ledger, reconciler and request cache.

use std::fmt::Display;

/// Errors surfaced by the sync core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A required field or identifier was missing or blank.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// The local durable store could not be read or written.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  /// The remote ledger rejected or failed an add/delete.
  #[error("remote write failed: {0}")]
  RemoteWrite(String),

  /// A fetch failed and nothing could stand in for it.
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),
}

/// Result type for sync core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub fn storage(context: &str, err: impl Display) -> Self {
    Error::StorageUnavailable(format!("{}: {}", context, err))
  }

  pub fn remote(context: &str, err: impl Display) -> Self {
    Error::RemoteWrite(format!("{}: {}", context, err))
  }

  pub fn network(context: &str, err: impl Display) -> Self {
    Error::NetworkUnavailable(format!("{}: {}", context, err))
  }

  /// Message shown to the user when an action fails.
  ///
  /// A storage failure only happens on the offline path, so its message
  /// makes clear the record was not even queued.
  pub fn user_message(&self) -> &'static str {
    match self {
      Error::InvalidArgument(_) => "Please enter both a name and a number.",
      Error::StorageUnavailable(_) => {
        "Could not save the contact offline. It was NOT queued and will not be synced."
      }
      Error::RemoteWrite(_) => "The server did not accept the change. Nothing was modified.",
      Error::NetworkUnavailable(_) => "You are offline. Try again once the connection is back.",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_offline_and_online_failures_have_distinct_messages() {
    let offline = Error::storage("enqueue", "disk full");
    let online = Error::remote("add", "permission denied");
    assert_ne!(offline.user_message(), online.user_message());
    assert!(offline.user_message().contains("NOT queued"));
  }

  #[test]
  fn test_context_is_kept_in_display() {
    let err = Error::storage("failed to open queue", "locked");
    assert_eq!(
      err.to_string(),
      "storage unavailable: failed to open queue: locked"
    );
  }
}
