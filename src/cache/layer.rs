//! Cache layer that owns the static and dynamic partitions.

use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::http::Response;

use super::storage::CacheStorage;
use super::traits::{CachedResponse, RequestKey};

/// Names of the partitions the current version uses.
#[derive(Debug, Clone)]
pub struct PartitionNames {
  pub static_name: String,
  pub dynamic_name: String,
}

/// Cache layer over a storage backend.
///
/// Every insertion into the dynamic partition spawns a size-bound pass.
/// The passes run in the background and are tracked here, so callers can
/// return a response before the partition is trimmed.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  names: PartitionNames,
  max_dynamic: usize,
  evictions: Arc<Mutex<JoinSet<()>>>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S, names: PartitionNames, max_dynamic: usize) -> Self {
    Self {
      storage: Arc::new(storage),
      names,
      max_dynamic,
      evictions: Arc::new(Mutex::new(JoinSet::new())),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Look a request up in every partition.
  pub fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.storage.match_key(None, key)
  }

  /// Store a full set of precached responses in the static partition.
  pub fn store_static(&self, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.storage.open_partition(&self.names.static_name)?;
    for (key, response) in entries {
      self.storage.put(&self.names.static_name, key, response)?;
    }
    Ok(())
  }

  /// Store a runtime response and schedule the size bound.
  pub fn store_dynamic(&self, key: &RequestKey, response: &Response) -> Result<()> {
    self.storage.put(&self.names.dynamic_name, key, response)?;
    self.spawn_size_bound();
    Ok(())
  }

  fn spawn_size_bound(&self) {
    let storage = Arc::clone(&self.storage);
    let partition = self.names.dynamic_name.clone();
    let max = self.max_dynamic;

    let mut evictions = self.evictions.lock().unwrap_or_else(|e| e.into_inner());
    // Reap passes that already finished
    while evictions.try_join_next().is_some() {}
    evictions.spawn(async move {
      if let Err(e) = enforce_size_bound(storage.as_ref(), &partition, max).await {
        warn!("Failed to trim cache {}: {}", partition, e);
      }
    });
  }

  /// Wait for every scheduled size-bound pass to finish.
  pub async fn settle(&self) {
    loop {
      let mut pending = {
        let mut evictions = self.evictions.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *evictions)
      };
      if pending.is_empty() {
        return;
      }
      while pending.join_next().await.is_some() {}
    }
  }

  /// Delete every partition that is not one of the current two.
  pub fn remove_stale_partitions(&self) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for name in self.storage.partition_names()? {
      if name != self.names.static_name && name != self.names.dynamic_name {
        info!("Deleting old cache: {}", name);
        self.storage.delete_partition(&name)?;
        removed.push(name);
      }
    }
    Ok(removed)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      names: self.names.clone(),
      max_dynamic: self.max_dynamic,
      evictions: Arc::clone(&self.evictions),
    }
  }
}

/// Remove the oldest entries, one at a time, until `partition` holds at most `max`.
///
/// The count is re-read after every removal, so entries added by other
/// requests while the pass runs are accounted for.
pub async fn enforce_size_bound<S: CacheStorage + ?Sized>(
  storage: &S,
  partition: &str,
  max: usize,
) -> Result<usize> {
  let mut removed = 0;
  loop {
    let keys = storage.keys(partition)?;
    if keys.len() <= max {
      break;
    }
    storage.delete(partition, &keys[0])?;
    removed += 1;
    debug!("Evicted {} from {}", keys[0].url, partition);
    tokio::task::yield_now().await;
  }
  Ok(removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;

  fn layer(max: usize) -> CacheLayer<SqliteStorage> {
    CacheLayer::new(
      SqliteStorage::in_memory().unwrap(),
      PartitionNames {
        static_name: "static-v2".to_string(),
        dynamic_name: "dynamic-v2".to_string(),
      },
      max,
    )
  }

  fn key(path: &str) -> RequestKey {
    RequestKey::new("GET", &format!("http://localhost:5173{}", path))
  }

  fn dynamic_urls(layer: &CacheLayer<SqliteStorage>) -> Vec<String> {
    layer
      .storage()
      .keys("dynamic-v2")
      .unwrap()
      .into_iter()
      .map(|k| k.url)
      .collect()
  }

  #[tokio::test]
  async fn test_fifo_eviction_keeps_newest() {
    let layer = layer(2);
    for path in ["/a", "/b", "/c"] {
      layer.store_dynamic(&key(path), &Response::ok(path)).unwrap();
    }
    layer.settle().await;

    assert_eq!(
      dynamic_urls(&layer),
      vec!["http://localhost:5173/b", "http://localhost:5173/c"]
    );
  }

  #[tokio::test]
  async fn test_eviction_is_by_insertion_not_use() {
    let layer = layer(2);
    layer.store_dynamic(&key("/a"), &Response::ok("a")).unwrap();
    layer.store_dynamic(&key("/b"), &Response::ok("b")).unwrap();
    layer.settle().await;

    // Reading /a does not refresh it
    assert!(layer.lookup(&key("/a")).unwrap().is_some());
    layer.store_dynamic(&key("/c"), &Response::ok("c")).unwrap();
    layer.settle().await;

    assert!(layer.lookup(&key("/a")).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_bound_holds_after_many_inserts() {
    let layer = layer(5);
    for i in 0..40 {
      layer
        .store_dynamic(&key(&format!("/item/{}", i)), &Response::ok("x"))
        .unwrap();
    }
    layer.settle().await;

    let urls = dynamic_urls(&layer);
    assert_eq!(urls.len(), 5);
    assert_eq!(urls[0], "http://localhost:5173/item/35");
  }

  #[tokio::test]
  async fn test_static_partition_is_not_bounded() {
    let layer = layer(1);
    let entries: Vec<_> = ["/", "/index.html", "/offline.html"]
      .iter()
      .map(|p| (key(p), Response::ok(*p)))
      .collect();
    layer.store_static(&entries).unwrap();
    layer.store_dynamic(&key("/x"), &Response::ok("x")).unwrap();
    layer.settle().await;

    assert_eq!(layer.storage().len("static-v2").unwrap(), 3);
  }

  #[tokio::test]
  async fn test_enforce_size_bound_reports_removed() {
    let storage = SqliteStorage::in_memory().unwrap();
    for path in ["/a", "/b", "/c", "/d"] {
      storage.put("p", &key(path), &Response::ok("x")).unwrap();
    }
    assert_eq!(enforce_size_bound(&storage, "p", 1).await.unwrap(), 3);
    assert_eq!(enforce_size_bound(&storage, "p", 1).await.unwrap(), 0);
  }

  #[test]
  fn test_remove_stale_partitions() {
    let layer = layer(10);
    for name in ["postgram-pwa-v0", "static-v2", "dynamic-v2", "other"] {
      layer.storage().open_partition(name).unwrap();
    }

    let removed = layer.remove_stale_partitions().unwrap();

    assert_eq!(removed, vec!["postgram-pwa-v0", "other"]);
    assert_eq!(
      layer.storage().partition_names().unwrap(),
      vec!["static-v2", "dynamic-v2"]
    );
  }
}
