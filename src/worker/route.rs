//! Request classification for the interception layer.

use url::Url;

use crate::config::ShellConfig;
use crate::http::Request;

/// Schemes the cache never touches.
const UNSUPPORTED_SCHEMES: &[&str] = &[
  "chrome-extension",
  "moz-extension",
  "safari-extension",
  "chrome",
  "about",
  "data",
  "blob",
  "file",
];

/// Why a request skips the cache entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
  NotGet,
  UnsupportedScheme,
  LedgerHost,
}

impl BypassReason {
  pub fn as_str(self) -> &'static str {
    match self {
      BypassReason::NotGet => "not a GET",
      BypassReason::UnsupportedScheme => "unsupported scheme",
      BypassReason::LedgerHost => "ledger host",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  Bypass(BypassReason),
  NetworkFirst,
  CacheFirst,
}

/// Inputs to [`classify`], derived from the shell settings.
#[derive(Debug, Clone)]
pub struct RouteRules {
  pub origin_host: Option<String>,
  pub api_marker: String,
  pub bypass_hosts: Vec<String>,
}

impl RouteRules {
  pub fn from_config(shell: &ShellConfig) -> Self {
    let origin_host = Url::parse(&shell.origin)
      .ok()
      .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
    Self {
      origin_host,
      api_marker: shell.api_marker.clone(),
      bypass_hosts: shell
        .bypass_hosts
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect(),
    }
  }

  fn is_bypass_host(&self, host: &str) -> bool {
    self.bypass_hosts.iter().any(|allowed| {
      host == allowed
        || host
          .strip_suffix(allowed.as_str())
          .is_some_and(|rest| rest.ends_with('.'))
    })
  }
}

/// Pick the strategy for a request. The first matching rule wins.
pub fn classify(request: &Request, rules: &RouteRules) -> Strategy {
  if !request.is_get() {
    return Strategy::Bypass(BypassReason::NotGet);
  }

  let Ok(url) = Url::parse(&request.url) else {
    return Strategy::Bypass(BypassReason::UnsupportedScheme);
  };
  let scheme = url.scheme();
  if UNSUPPORTED_SCHEMES.contains(&scheme) || (scheme != "http" && scheme != "https") {
    return Strategy::Bypass(BypassReason::UnsupportedScheme);
  }

  let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
  if rules.is_bypass_host(&host) {
    return Strategy::Bypass(BypassReason::LedgerHost);
  }

  // Only the host is compared, so another port on the same host is local
  let foreign = rules.origin_host.as_deref() != Some(host.as_str());
  if url.path().contains(&rules.api_marker) || foreign {
    return Strategy::NetworkFirst;
  }

  Strategy::CacheFirst
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rules() -> RouteRules {
    RouteRules::from_config(&ShellConfig::default())
  }

  #[test]
  fn test_non_get_is_bypassed() {
    let req = Request::get("http://localhost:5173/api/x").with_method("POST");
    assert_eq!(
      classify(&req, &rules()),
      Strategy::Bypass(BypassReason::NotGet)
    );
  }

  #[test]
  fn test_unsupported_schemes_are_bypassed() {
    for url in [
      "chrome-extension://abc/script.js",
      "moz-extension://abc/x",
      "data:text/plain,hello",
      "blob:http://localhost:5173/1234",
      "file:///etc/hosts",
      "ftp://example.com/x",
      "not a url",
    ] {
      assert_eq!(
        classify(&Request::get(url), &rules()),
        Strategy::Bypass(BypassReason::UnsupportedScheme),
        "{}",
        url
      );
    }
  }

  #[test]
  fn test_ledger_hosts_are_bypassed() {
    for url in [
      "https://firestore.googleapis.com/v1/projects/p",
      "https://firebasestorage.googleapis.com/o/img.png",
      "https://www.googleapis.com/identitytoolkit",
    ] {
      assert_eq!(
        classify(&Request::get(url), &rules()),
        Strategy::Bypass(BypassReason::LedgerHost),
        "{}",
        url
      );
    }
  }

  #[test]
  fn test_suffix_match_needs_a_dot() {
    let req = Request::get("https://notgoogleapis.com/x");
    assert_eq!(classify(&req, &rules()), Strategy::NetworkFirst);
  }

  #[test]
  fn test_api_and_foreign_hosts_are_network_first() {
    let api = Request::get("http://localhost:5173/api/contacts");
    assert_eq!(classify(&api, &rules()), Strategy::NetworkFirst);

    let cdn = Request::get("https://cdn.example.com/lib.js");
    assert_eq!(classify(&cdn, &rules()), Strategy::NetworkFirst);
  }

  #[test]
  fn test_same_origin_assets_are_cache_first() {
    for url in [
      "http://localhost:5173/",
      "http://localhost:5173/assets/app.js",
      "http://localhost:4000/other-port.css",
    ] {
      assert_eq!(
        classify(&Request::get(url), &rules()),
        Strategy::CacheFirst,
        "{}",
        url
      );
    }
  }
}
