//! Serde types matching the Firestore REST document format.
//!
//! Kept apart from [`Record`](super::Record) so the wire shape does not leak
//! into the rest of the crate.

use serde::{Deserialize, Serialize};

use super::{NewRecord, Record};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApiValue {
  #[serde(rename = "stringValue", skip_serializing_if = "Option::is_none")]
  pub string_value: Option<String>,
}

impl ApiValue {
  fn string(value: &str) -> Self {
    Self {
      string_value: Some(value.to_string()),
    }
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApiRecordFields {
  #[serde(default)]
  pub name: ApiValue,
  #[serde(default)]
  pub number: ApiValue,
}

/// Body for creating a document.
#[derive(Debug, Serialize)]
pub struct ApiCreateDocument {
  pub fields: ApiRecordFields,
}

impl From<&NewRecord> for ApiCreateDocument {
  fn from(record: &NewRecord) -> Self {
    Self {
      fields: ApiRecordFields {
        name: ApiValue::string(&record.name),
        number: ApiValue::string(&record.number),
      },
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiDocument {
  /// Full resource name, `projects/{p}/databases/(default)/documents/{collection}/{id}`
  pub name: String,
  #[serde(default)]
  pub fields: ApiRecordFields,
}

impl ApiDocument {
  pub fn into_record(self) -> Record {
    let id = self
      .name
      .rsplit('/')
      .next()
      .unwrap_or_default()
      .to_string();
    Record {
      id,
      name: self.fields.name.string_value.unwrap_or_default(),
      number: self.fields.number.string_value.unwrap_or_default(),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiListDocumentsResponse {
  #[serde(default)]
  pub documents: Vec<ApiDocument>,
  #[serde(rename = "nextPageToken")]
  pub next_page_token: Option<String>,
}
