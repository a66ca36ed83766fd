use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::Database;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub ledger: LedgerConfig,
  #[serde(default)]
  pub shell: ShellConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

/// Remote ledger (Firestore REST) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
  pub base_url: String,
  pub project_id: String,
  pub collection: String,
  /// Web API key; `POSTGRAM_API_KEY` overrides it
  pub api_key: Option<String>,
  /// How often the live subscription re-reads the collection
  pub poll_interval_secs: u64,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      base_url: "https://firestore.googleapis.com/v1".to_string(),
      project_id: "postgram-pwa".to_string(),
      collection: "contacts".to_string(),
      api_key: None,
      poll_interval_secs: 5,
    }
  }
}

/// App shell served through the request cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
  /// Origin the shell is served from, e.g. `http://localhost:5173`
  pub origin: String,
  /// Assets precached into the static partition on install
  pub static_assets: Vec<String>,
  /// Page served to navigation requests when offline
  pub offline_page: String,
  /// Path fragment marking API requests (network-first)
  pub api_marker: String,
  /// Ledger/storage hosts that are never cached (subdomains included)
  pub bypass_hosts: Vec<String>,
  /// Activate right after install instead of waiting for a skip-waiting message
  pub skip_waiting_on_install: bool,
}

impl Default for ShellConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5173".to_string(),
      static_assets: ["/", "/index.html", "/offline.html", "/manifest.json"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      offline_page: "/offline.html".to_string(),
      api_marker: "/api/".to_string(),
      bypass_hosts: [
        "firebasestorage.googleapis.com",
        "firestore.googleapis.com",
        "googleapis.com",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      skip_waiting_on_install: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub static_name: String,
  pub dynamic_name: String,
  pub max_dynamic_entries: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      static_name: "postgram-pwa-v1".to_string(),
      dynamic_name: "postgram-dynamic-v1".to_string(),
      max_dynamic_entries: 50,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  /// `host:port` probed to decide whether the network is reachable
  pub probe_addr: String,
  pub probe_interval_secs: u64,
  pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_addr: "firestore.googleapis.com:443".to_string(),
      probe_interval_secs: 10,
      probe_timeout_ms: 3000,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Where queue.db, cache.db and logs live (defaults to the XDG data dir)
  pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
  pub fn resolve_data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.clone()),
      None => Database::default_dir().ok_or_else(|| eyre!("Could not determine data directory")),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./postgram.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/postgram/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Some(key) = Self::get_api_key() {
      config.ledger.api_key = Some(key);
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("postgram.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("postgram").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the ledger API key from the environment.
  pub fn get_api_key() -> Option<String> {
    std::env::var("POSTGRAM_API_KEY").ok().filter(|k| !k.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_config_keeps_defaults() {
    let config = Config::parse(
      r#"
shell:
  origin: https://contacts.example.com
cache:
  max_dynamic_entries: 10
"#,
    )
    .unwrap();

    assert_eq!(config.shell.origin, "https://contacts.example.com");
    assert_eq!(config.shell.offline_page, "/offline.html");
    assert_eq!(config.cache.max_dynamic_entries, 10);
    assert_eq!(config.cache.dynamic_name, "postgram-dynamic-v1");
    assert_eq!(config.ledger.collection, "contacts");
  }

  #[test]
  fn test_empty_file_is_default() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.shell.static_assets.len(), 4);
    assert_eq!(config.connectivity.probe_interval_secs, 10);
  }

  #[test]
  fn test_explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("postgram.yaml");
    std::fs::write(&path, "storage:\n  data_dir: /tmp/postgram-test\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(
      config.storage.resolve_data_dir().unwrap(),
      PathBuf::from("/tmp/postgram-test")
    );
  }
}
