//! Request and response values passed through the interception layer.

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  /// Subresource fetch issued by the page
  Subresource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: String,
  pub mode: RequestMode,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn get(url: &str) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.to_string(),
      mode: RequestMode::Subresource,
      headers: Vec::new(),
    }
  }

  pub fn navigate(url: &str) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_ascii_uppercase();
    self
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// Response type, in the Fetch sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response
  Basic,
  /// Cross-origin response with readable body
  Cors,
  /// Cross-origin response with hidden body
  Opaque,
  /// Network error
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn ok(body: impl Into<Vec<u8>>) -> Self {
    Self {
      status: 200,
      status_text: "OK".to_string(),
      headers: Vec::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  /// Synthetic reply for a resource that is neither cached nor reachable.
  pub fn service_unavailable() -> Self {
    Self {
      status: 503,
      status_text: "Service Unavailable".to_string(),
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Offline - Content not available".to_vec(),
      kind: ResponseKind::Basic,
    }
  }

  /// A failed fetch, as seen by the page.
  pub fn network_error() -> Self {
    Self {
      status: 0,
      status_text: String::new(),
      headers: Vec::new(),
      body: Vec::new(),
      kind: ResponseKind::Error,
    }
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_network_error(&self) -> bool {
    self.kind == ResponseKind::Error
  }

  /// Only complete same-origin responses are stored.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cacheable_requires_basic_200() {
    assert!(Response::ok("x").is_cacheable());

    let cors = Response {
      kind: ResponseKind::Cors,
      ..Response::ok("x")
    };
    assert!(!cors.is_cacheable());

    let partial = Response {
      status: 206,
      ..Response::ok("x")
    };
    assert!(partial.is_ok());
    assert!(!partial.is_cacheable());

    assert!(!Response::service_unavailable().is_cacheable());
    assert!(!Response::network_error().is_cacheable());
  }

  #[test]
  fn test_method_helpers() {
    assert!(Request::get("http://a/").is_get());
    assert!(!Request::get("http://a/").with_method("post").is_get());
    assert!(Request::navigate("http://a/").is_navigation());
  }
}
