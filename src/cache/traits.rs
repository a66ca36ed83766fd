//! Core types for the request cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Request, Response};

/// Cache lookup key: method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: normalize_url(url),
    }
  }

  pub fn for_request(request: &Request) -> Self {
    Self::new(&request.method, &request.url)
  }

  /// SHA256 hash for stable, fixed-length storage keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Normalize a URL for matching. Fragments never take part in a match.
fn normalize_url(raw: &str) -> String {
  match Url::parse(raw) {
    Ok(mut url) => {
      url.set_fragment(None);
      url.to_string()
    }
    Err(_) => raw.trim().to_string(),
  }
}

/// A stored response together with when it was stored.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_normalization() {
    let a = RequestKey::new("get", "HTTP://Example.com/app/index.html#top");
    let b = RequestKey::new("GET", "http://example.com/app/index.html");
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_method_is_part_of_the_key() {
    let get = RequestKey::new("GET", "http://example.com/");
    let head = RequestKey::new("HEAD", "http://example.com/");
    assert_ne!(get.cache_hash(), head.cache_hash());
  }

  #[test]
  fn test_query_is_part_of_the_key() {
    let a = RequestKey::new("GET", "http://example.com/api/x?page=1");
    let b = RequestKey::new("GET", "http://example.com/api/x?page=2");
    assert_ne!(a, b);
  }
}
