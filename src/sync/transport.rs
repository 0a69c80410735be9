use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use url::Url;

use super::batch::SyncBatch;
use super::error::SyncError;

/// Per-kind counts the server reports as created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreatedCounts {
  pub products: u64,
  pub sales: u64,
  pub purchases: u64,
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
  pub status: u16,
  /// Parsed from `{"created": {...}}` when the server sends it
  pub created: Option<CreatedCounts>,
}

#[derive(Deserialize)]
struct AckBody {
  created: CreatedCounts,
}

impl SubmitResponse {
  /// Build a response from a success status and raw body.
  /// An unparseable body is still a success.
  pub fn from_body(status: u16, body: &[u8]) -> Self {
    let created = serde_json::from_slice::<AckBody>(body)
      .ok()
      .map(|ack| ack.created);
    Self { status, created }
  }
}

/// Submits sync batches to the server.
///
/// Implementations return `Ok` only for success statuses.
pub trait Transport: Send + Sync {
  fn submit(
    &self,
    batch: &SyncBatch,
    batch_id: &str,
  ) -> impl Future<Output = Result<SubmitResponse, SyncError>> + Send;
}

/// `POST`s batches as JSON to the sync endpoint.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
  endpoint: Url,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(client: Client, endpoint: Url, token: Option<String>) -> Self {
    Self {
      client,
      endpoint,
      token,
    }
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

impl Transport for HttpTransport {
  async fn submit(&self, batch: &SyncBatch, batch_id: &str) -> Result<SubmitResponse, SyncError> {
    let mut request = self
      .client
      .post(self.endpoint.clone())
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .header("Idempotency-Key", batch_id)
      .json(batch);

    if let Some(token) = &self.token {
      request = request.header(AUTHORIZATION, format!("Bearer {}", token));
    }

    let response = request
      .send()
      .await
      .map_err(|e| SyncError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(SyncError::Rejected {
        status: status.as_u16(),
      });
    }

    // The batch is accepted at this point; a failed body read only loses the counts
    let body = response.bytes().await.unwrap_or_default();
    Ok(SubmitResponse::from_body(status.as_u16(), &body))
  }
}
