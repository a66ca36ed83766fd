//! The shell worker: a single dispatcher over lifecycle and fetch events.
//!
//! Install precaches the shell into the static partition, activate drops
//! partitions from older versions, and every fetch is routed to one of
//! three strategies (bypass, network-first, cache-first). A fetch always
//! produces a [`Response`]; network and cache failures are turned into a
//! stand-in response instead of an error.

mod network;
mod route;

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheStorage, CachedResponse, RequestKey};
use crate::config::ShellConfig;
use crate::http::{Request, Response};
use crate::records::SYNC_TAG;

pub use network::{CacheMode, HttpNetwork, Network};
pub use route::{classify, RouteRules, Strategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
  SkipWaiting,
}

/// Events delivered to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  Sync { tag: String },
  Message(WorkerMessage),
}

/// What the worker did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
  Installed { precached: usize },
  Activated { removed: Vec<String>, clients_claimed: bool },
  Respond(Response),
  SyncAcknowledged { tag: String },
  SkipWaiting,
  Ignored,
}

pub struct ShellWorker<S: CacheStorage> {
  cache: CacheLayer<S>,
  network: Arc<dyn Network>,
  rules: RouteRules,
  origin: Option<Url>,
  static_assets: Vec<String>,
  offline_page: String,
  skip_waiting_on_install: bool,
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
}

impl<S: CacheStorage> ShellWorker<S> {
  pub fn new(cache: CacheLayer<S>, network: Arc<dyn Network>, shell: &ShellConfig) -> Self {
    Self {
      cache,
      network,
      rules: RouteRules::from_config(shell),
      origin: Url::parse(&shell.origin).ok(),
      static_assets: shell.static_assets.clone(),
      offline_page: shell.offline_page.clone(),
      skip_waiting_on_install: shell.skip_waiting_on_install,
      skip_waiting: AtomicBool::new(false),
      clients_claimed: AtomicBool::new(false),
    }
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  pub fn controls_clients(&self) -> bool {
    self.clients_claimed.load(Ordering::SeqCst)
  }

  pub async fn dispatch(&self, event: WorkerEvent) -> WorkerOutcome {
    match event {
      WorkerEvent::Install => self.install().await,
      WorkerEvent::Activate => self.activate(),
      WorkerEvent::Fetch(request) => WorkerOutcome::Respond(self.fetch(&request).await),
      WorkerEvent::Sync { tag } if tag == SYNC_TAG => {
        info!("Background sync requested: {}", tag);
        WorkerOutcome::SyncAcknowledged { tag }
      }
      WorkerEvent::Sync { tag } => {
        debug!("Ignoring unknown sync tag {}", tag);
        WorkerOutcome::Ignored
      }
      WorkerEvent::Message(WorkerMessage::SkipWaiting) => {
        self.skip_waiting.store(true, Ordering::SeqCst);
        WorkerOutcome::SkipWaiting
      }
    }
  }

  /// Resolve a shell path against the configured origin.
  fn shell_url(&self, path: &str) -> String {
    match &self.origin {
      Some(origin) => origin
        .join(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| path.to_string()),
      None => path.to_string(),
    }
  }

  async fn install(&self) -> WorkerOutcome {
    info!("Installing shell, precaching {} assets", self.static_assets.len());
    if self.skip_waiting_on_install {
      self.skip_waiting.store(true, Ordering::SeqCst);
    }

    let requests: Vec<Request> = self
      .static_assets
      .iter()
      .map(|path| Request::get(&self.shell_url(path)))
      .collect();
    let fetches = requests
      .iter()
      .map(|request| self.network.fetch(request, CacheMode::Reload));
    let results = join_all(fetches).await;

    let mut entries = Vec::with_capacity(requests.len());
    for (request, result) in requests.iter().zip(results) {
      match result {
        Ok(resp) if resp.is_ok() => entries.push((RequestKey::for_request(request), resp)),
        Ok(resp) => {
          error!("Precache failed: {} returned {}", request.url, resp.status);
          return WorkerOutcome::Installed { precached: 0 };
        }
        Err(e) => {
          error!("Precache failed: {}", e);
          return WorkerOutcome::Installed { precached: 0 };
        }
      }
    }

    match self.cache.store_static(&entries) {
      Ok(()) => WorkerOutcome::Installed { precached: entries.len() },
      Err(e) => {
        error!("Precache failed: {}", e);
        WorkerOutcome::Installed { precached: 0 }
      }
    }
  }

  fn activate(&self) -> WorkerOutcome {
    let removed = self.cache.remove_stale_partitions().unwrap_or_else(|e| {
      warn!("Failed to clean up old caches: {}", e);
      Vec::new()
    });
    self.clients_claimed.store(true, Ordering::SeqCst);
    info!("Shell activated");
    WorkerOutcome::Activated {
      removed,
      clients_claimed: true,
    }
  }

  /// Answer a request. Never fails.
  pub async fn fetch(&self, request: &Request) -> Response {
    let strategy = classify(request, &self.rules);
    debug!("{} {} -> {:?}", request.method, request.url, strategy);

    match strategy {
      Strategy::Bypass(reason) => self
        .network
        .fetch(request, CacheMode::Default)
        .await
        .unwrap_or_else(|e| {
          debug!("Bypassed fetch ({}) failed: {}", reason.as_str(), e);
          Response::network_error()
        }),
      Strategy::NetworkFirst => self.network_first(request).await,
      Strategy::CacheFirst => self.cache_first(request).await,
    }
  }

  fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
    self.cache.lookup(key).unwrap_or_else(|e| {
      warn!("Cache lookup failed: {}", e);
      None
    })
  }

  fn store(&self, key: &RequestKey, response: &Response) {
    if !response.is_cacheable() {
      return;
    }
    if let Err(e) = self.cache.store_dynamic(key, response) {
      warn!("Failed to cache {}: {}", key.url, e);
    }
  }

  async fn network_first(&self, request: &Request) -> Response {
    let key = RequestKey::for_request(request);
    match self.network.fetch(request, CacheMode::Default).await {
      Ok(resp) => {
        self.store(&key, &resp);
        resp
      }
      Err(e) => {
        debug!("Network failed, trying cache: {}", e);
        match self.lookup(&key) {
          Some(cached) => {
            info!("Serving {} from cache (stored {})", key.url, cached.cached_at);
            cached.response
          }
          None => Response::network_error(),
        }
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> Response {
    let key = RequestKey::for_request(request);
    // Check cache first
    if let Some(hit) = self.lookup(&key) {
      return hit.response;
    }

    match self.network.fetch(request, CacheMode::Default).await {
      Ok(resp) => {
        self.store(&key, &resp);
        resp
      }
      Err(e) => {
        debug!("Offline and not cached: {}", e);
        if request.is_navigation() {
          let offline = RequestKey::new("GET", &self.shell_url(&self.offline_page));
          if let Some(page) = self.lookup(&offline) {
            return page.response;
          }
        }
        Response::service_unavailable()
      }
    }
  }
}
