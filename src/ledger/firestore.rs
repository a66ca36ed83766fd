use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::LedgerConfig;
use crate::error::{Error, Result};

use super::api_types::{ApiCreateDocument, ApiDocument, ApiListDocumentsResponse};
use super::{validate_id, NewRecord, Record, RemoteLedger, SnapshotListener, Subscription};

const PAGE_SIZE: u32 = 300;

/// Ledger backed by a Firestore collection through its REST API.
#[derive(Clone)]
pub struct FirestoreLedger {
  client: reqwest::Client,
  collection_url: String,
  api_key: Option<String>,
  poll_interval: Duration,
}

impl FirestoreLedger {
  pub fn new(config: &LedgerConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| Error::network("failed to create ledger client", e))?;

    let collection_url = format!(
      "{}/projects/{}/databases/(default)/documents/{}",
      config.base_url.trim_end_matches('/'),
      config.project_id,
      config.collection
    );

    Ok(Self {
      client,
      collection_url,
      api_key: config.api_key.clone(),
      poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
    })
  }

  /// URL of one document; `id` is percent-encoded as a single segment.
  fn document_url(&self, id: &str) -> Result<Url> {
    let mut url = Url::parse(&self.collection_url)
      .map_err(|e| Error::InvalidArgument(format!("invalid ledger url: {}", e)))?;
    url
      .path_segments_mut()
      .map_err(|_| Error::InvalidArgument("ledger url cannot hold a document path".to_string()))?
      .push(id);
    Ok(url)
  }

  fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.api_key {
      Some(key) => req.query(&[("key", key)]),
      None => req,
    }
  }

  /// Read the whole collection, following page tokens.
  pub async fn list(&self) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
      let mut req = self
        .client
        .get(&self.collection_url)
        .query(&[("pageSize", PAGE_SIZE.to_string())]);
      if let Some(token) = &page_token {
        req = req.query(&[("pageToken", token)]);
      }

      let response = self
        .with_key(req)
        .send()
        .await
        .map_err(|e| Error::network("failed to list records", e))?
        .error_for_status()
        .map_err(|e| Error::network("failed to list records", e))?;

      let page: ApiListDocumentsResponse = response
        .json()
        .await
        .map_err(|e| Error::network("failed to parse record list", e))?;

      records.extend(page.documents.into_iter().map(|doc| doc.into_record()));

      match page.next_page_token {
        Some(token) if !token.is_empty() => page_token = Some(token),
        _ => break,
      }
    }

    Ok(records)
  }
}

#[async_trait]
impl RemoteLedger for FirestoreLedger {
  fn subscribe(&self, on_change: SnapshotListener) -> Subscription {
    let ledger = self.clone();

    let task = tokio::spawn(async move {
      let mut last: Option<Vec<Record>> = None;
      let mut timer = tokio::time::interval(ledger.poll_interval);

      loop {
        timer.tick().await;

        match ledger.list().await {
          Ok(records) => {
            if last.as_ref() != Some(&records) {
              debug!("Ledger snapshot changed ({} records)", records.len());
              on_change(records.clone());
              last = Some(records);
            }
          }
          Err(e) => warn!("Ledger poll failed: {}", e),
        }
      }
    });

    Subscription::new(task)
  }

  async fn add(&self, record: &NewRecord) -> Result<()> {
    let req = self
      .client
      .post(&self.collection_url)
      .json(&ApiCreateDocument::from(record));

    let response = self
      .with_key(req)
      .send()
      .await
      .map_err(|e| Error::remote("failed to add record", e))?
      .error_for_status()
      .map_err(|e| Error::remote("failed to add record", e))?;

    // The write already succeeded; the body is only used for the log line
    match response.json::<ApiDocument>().await {
      Ok(doc) => info!("Record added to ledger: {}", doc.into_record().id),
      Err(_) => info!("Record added to ledger"),
    }
    Ok(())
  }

  async fn delete(&self, id: &str) -> Result<()> {
    let id = validate_id(id)?;
    let url = self.document_url(id)?;

    self
      .with_key(self.client.delete(url))
      .send()
      .await
      .map_err(|e| Error::remote("failed to delete record", e))?
      .error_for_status()
      .map_err(|e| Error::remote("failed to delete record", e))?;

    info!("Record deleted from ledger: {}", id);
    Ok(())
  }
}
