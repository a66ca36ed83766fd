//! Outbound fetches for the interception layer.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{Request, Response, ResponseKind};

/// How the fetch should treat intermediary HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
  #[default]
  Default,
  /// Skip any HTTP cache on the way (used for precaching)
  Reload,
}

/// The real network, as the interception layer sees it.
///
/// `Err` means the fetch itself failed (DNS, refused, timeout). Any
/// response the server sends back, whatever its status, is `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request, mode: CacheMode) -> Result<Response>;
}

/// [`Network`] implementation over reqwest.
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Option<Url>,
}

impl HttpNetwork {
  pub fn new(origin: &str) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| Error::network("failed to create http client", e))?;

    Ok(Self {
      client,
      origin: Url::parse(origin).ok(),
    })
  }

  fn kind_for(&self, url: &Url) -> ResponseKind {
    match &self.origin {
      Some(origin) if origin.origin() == url.origin() => ResponseKind::Basic,
      _ => ResponseKind::Cors,
    }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request, mode: CacheMode) -> Result<Response> {
    let url = Url::parse(&request.url)
      .map_err(|e| Error::network(&format!("invalid url {}", request.url), e))?;
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| Error::network("invalid method", e))?;

    let mut req = self.client.request(method, url.clone());
    for (name, value) in &request.headers {
      req = req.header(name.as_str(), value.as_str());
    }
    if mode == CacheMode::Reload {
      req = req
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .header(reqwest::header::PRAGMA, "no-cache");
    }

    let resp = req
      .send()
      .await
      .map_err(|e| Error::network(&format!("fetch {} failed", request.url), e))?;

    let status = resp.status();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
      .collect();
    let body = resp
      .bytes()
      .await
      .map_err(|e| Error::network(&format!("reading {} failed", request.url), e))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
      kind: self.kind_for(&url),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_follows_origin() {
    let net = HttpNetwork::new("http://localhost:5173").unwrap();
    let same = Url::parse("http://localhost:5173/index.html").unwrap();
    let other_port = Url::parse("http://localhost:4000/index.html").unwrap();
    let cdn = Url::parse("https://cdn.example.com/lib.js").unwrap();

    assert_eq!(net.kind_for(&same), ResponseKind::Basic);
    assert_eq!(net.kind_for(&other_port), ResponseKind::Cors);
    assert_eq!(net.kind_for(&cdn), ResponseKind::Cors);
  }

  #[tokio::test]
  async fn test_unparseable_url_is_a_network_error() {
    let net = HttpNetwork::new("http://localhost:5173").unwrap();
    let err = net
      .fetch(&Request::get("::nope::"), CacheMode::Default)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::NetworkUnavailable(_)));
  }
}
