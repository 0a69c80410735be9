use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::batch::{batch_id, SyncBatch};
use super::error::SyncError;
use super::transport::{CreatedCounts, Transport};
use crate::queue::QueueStorage;

/// Result of a single sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  /// The queue was empty, nothing was sent
  NothingQueued,
  /// Another attempt was still in flight, nothing was done
  AlreadyRunning,
  /// The server accepted the batch and the submitted operations were removed
  Synced {
    submitted: usize,
    batch_id: String,
    created: Option<CreatedCounts>,
  },
  /// The queue is untouched and will be resubmitted next time
  Failed(SyncError),
}

impl SyncOutcome {
  pub fn is_synced(&self) -> bool {
    matches!(self, SyncOutcome::Synced { .. })
  }
}

/// Flushes a queue through a transport, one attempt at a time.
pub struct SyncClient<S: QueueStorage, T: Transport> {
  storage: Arc<S>,
  transport: T,
  in_flight: AtomicBool,
}

impl<S: QueueStorage, T: Transport> SyncClient<S, T> {
  pub fn new(storage: Arc<S>, transport: T) -> Self {
    Self {
      storage,
      transport,
      in_flight: AtomicBool::new(false),
    }
  }

  /// Whether an attempt is currently outstanding.
  pub fn is_syncing(&self) -> bool {
    self.in_flight.load(Ordering::Acquire)
  }

  /// Submit everything queued and remove the submitted operations on success.
  ///
  /// Never returns an error: failures leave the queue as it was and are
  /// reported through `SyncOutcome::Failed`. A call made while another is
  /// outstanding returns `AlreadyRunning` without reading the queue.
  pub async fn sync_now(&self) -> SyncOutcome {
    let Some(_guard) = InFlight::acquire(&self.in_flight) else {
      debug!("sync already in flight");
      return SyncOutcome::AlreadyRunning;
    };

    let operations = match self.storage.read_all() {
      Ok(ops) => ops,
      Err(e) => {
        warn!(error = %e, "could not read queue");
        return SyncOutcome::Failed(SyncError::StorageUnavailable(e.to_string()));
      }
    };

    if operations.is_empty() {
      debug!("nothing queued");
      return SyncOutcome::NothingQueued;
    }

    let batch = SyncBatch::from_operations(&operations);
    let batch_id = batch_id(&operations);
    info!(
      products = batch.products.len(),
      sales = batch.sales.len(),
      purchases = batch.purchases.len(),
      %batch_id,
      "submitting batch"
    );

    let response = match self.transport.submit(&batch, &batch_id).await {
      Ok(response) => response,
      Err(e) => {
        warn!(error = %e, %batch_id, "sync failed, keeping queue");
        return SyncOutcome::Failed(e);
      }
    };

    // Only what was submitted is acknowledged; anything queued since stays.
    // Accepted but not removed: the same records go out again next time.
    let last_id = operations.iter().map(|op| op.id).max().unwrap_or_default();
    if let Err(e) = self.storage.remove_through(last_id) {
      warn!(error = %e, %batch_id, "batch accepted but queue could not be updated");
      return SyncOutcome::Failed(SyncError::StorageUnavailable(e.to_string()));
    }

    info!(submitted = operations.len(), status = response.status, "sync complete");
    SyncOutcome::Synced {
      submitted: operations.len(),
      batch_id,
      created: response.created,
    }
  }
}

/// Holds the in-flight flag for the duration of one attempt.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::queue::{OperationKind, QueuedOperation, SqliteQueue};
  use crate::sync::transport::SubmitResponse;
  use color_eyre::{eyre::eyre, Result};
  use serde_json::{json, Value};
  use std::sync::Mutex;
  use std::time::Duration;
  use tokio::sync::Notify;

  /// Records every submission and answers with a fixed result.
  struct FakeTransport {
    result: Result<SubmitResponse, SyncError>,
    calls: Mutex<Vec<(SyncBatch, String)>>,
  }

  impl FakeTransport {
    fn accepting() -> Self {
      Self::with_result(Ok(SubmitResponse {
        status: 200,
        created: None,
      }))
    }

    fn with_result(result: Result<SubmitResponse, SyncError>) -> Self {
      Self {
        result,
        calls: Mutex::new(Vec::new()),
      }
    }

    fn calls(&self) -> Vec<(SyncBatch, String)> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Transport for FakeTransport {
    async fn submit(&self, batch: &SyncBatch, batch_id: &str) -> Result<SubmitResponse, SyncError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((batch.clone(), batch_id.to_string()));
      self.result.clone()
    }
  }

  /// Blocks every submission until released.
  struct GatedTransport {
    gate: Arc<Notify>,
  }

  impl Transport for GatedTransport {
    async fn submit(&self, _batch: &SyncBatch, _batch_id: &str) -> Result<SubmitResponse, SyncError> {
      self.gate.notified().await;
      Ok(SubmitResponse {
        status: 200,
        created: None,
      })
    }
  }

  /// Storage whose backing database is gone.
  struct BrokenStorage;

  impl QueueStorage for BrokenStorage {
    fn enqueue(&self, _kind: OperationKind, _payload: Value) -> Result<QueuedOperation> {
      Err(eyre!("database unavailable"))
    }

    fn read_all(&self) -> Result<Vec<QueuedOperation>> {
      Err(eyre!("database unavailable"))
    }

    fn clear_all(&self) -> Result<()> {
      Err(eyre!("database unavailable"))
    }

    fn remove_through(&self, _last_id: i64) -> Result<usize> {
      Err(eyre!("database unavailable"))
    }
  }

  fn queue() -> Arc<SqliteQueue> {
    Arc::new(SqliteQueue::new(Database::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn test_empty_queue_sends_nothing() {
    let client = SyncClient::new(queue(), FakeTransport::accepting());

    assert_eq!(client.sync_now().await, SyncOutcome::NothingQueued);
    assert!(client.transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_success_groups_and_clears() {
    let queue = queue();
    queue
      .enqueue(OperationKind::Product, json!({"sku": "P1", "name": "Pen"}))
      .unwrap();
    queue
      .enqueue(OperationKind::Sale, json!({"items": [{"product_id": 1, "qty": 2}]}))
      .unwrap();

    let client = SyncClient::new(queue.clone(), FakeTransport::accepting());
    let outcome = client.sync_now().await;

    assert!(outcome.is_synced());
    let calls = client.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
      serde_json::to_value(&calls[0].0).unwrap(),
      json!({
        "products": [{"sku": "P1", "name": "Pen"}],
        "sales": [{"items": [{"product_id": 1, "qty": 2}]}],
        "purchases": []
      })
    );
    assert!(queue.read_all().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_failure_keeps_queue() {
    let queue = queue();
    queue
      .enqueue(OperationKind::Product, json!({"sku": "P1"}))
      .unwrap();
    queue.enqueue(OperationKind::Sale, json!({"items": []})).unwrap();
    let before = queue.read_all().unwrap();

    let transport =
      FakeTransport::with_result(Err(SyncError::Network("connection refused".to_string())));
    let client = SyncClient::new(queue.clone(), transport);

    assert!(matches!(
      client.sync_now().await,
      SyncOutcome::Failed(SyncError::Network(_))
    ));
    assert_eq!(queue.read_all().unwrap(), before);
  }

  #[tokio::test]
  async fn test_rejected_batch_is_resubmitted_in_full() {
    let queue = queue();
    queue
      .enqueue(OperationKind::Purchase, json!({"items": [{"qty": 5}]}))
      .unwrap();

    let transport = FakeTransport::with_result(Err(SyncError::Rejected { status: 500 }));
    let client = SyncClient::new(queue.clone(), transport);

    client.sync_now().await;
    client.sync_now().await;

    let calls = client.transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
    assert_eq!(queue.read_all().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_reports_created_counts() {
    let queue = queue();
    queue.enqueue(OperationKind::Sale, json!({"items": []})).unwrap();

    let created = CreatedCounts {
      products: 0,
      sales: 1,
      purchases: 0,
    };
    let transport = FakeTransport::with_result(Ok(SubmitResponse {
      status: 200,
      created: Some(created),
    }));
    let client = SyncClient::new(queue, transport);

    match client.sync_now().await {
      SyncOutcome::Synced {
        submitted,
        created: reported,
        ..
      } => {
        assert_eq!(submitted, 1);
        assert_eq!(reported, Some(created));
      }
      other => panic!("expected Synced, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_storage_unavailable_is_reported() {
    let client = SyncClient::new(Arc::new(BrokenStorage), FakeTransport::accepting());

    assert!(matches!(
      client.sync_now().await,
      SyncOutcome::Failed(SyncError::StorageUnavailable(_))
    ));
    assert!(client.transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_sync_is_rejected() {
    let queue = queue();
    queue.enqueue(OperationKind::Sale, json!({})).unwrap();

    let gate = Arc::new(Notify::new());
    let client = Arc::new(SyncClient::new(
      queue.clone(),
      GatedTransport { gate: gate.clone() },
    ));

    let first = tokio::spawn({
      let client = client.clone();
      async move { client.sync_now().await }
    });

    // Wait until the first attempt holds the guard
    while !client.is_syncing() {
      tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(client.sync_now().await, SyncOutcome::AlreadyRunning);

    gate.notify_one();
    assert!(first.await.unwrap().is_synced());
    assert!(!client.is_syncing());
    assert!(queue.read_all().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_operation_queued_during_sync_survives() {
    let queue = queue();
    queue.enqueue(OperationKind::Product, json!({"n": 1})).unwrap();

    let gate = Arc::new(Notify::new());
    let client = Arc::new(SyncClient::new(
      queue.clone(),
      GatedTransport { gate: gate.clone() },
    ));

    let first = tokio::spawn({
      let client = client.clone();
      async move { client.sync_now().await }
    });
    while !client.is_syncing() {
      tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // Recorded after the batch was read, so the server never sees it
    let late = queue.enqueue(OperationKind::Sale, json!({"n": 2})).unwrap();
    gate.notify_one();

    match first.await.unwrap() {
      SyncOutcome::Synced { submitted, .. } => assert_eq!(submitted, 1),
      other => panic!("expected Synced, got {:?}", other),
    }
    assert_eq!(queue.read_all().unwrap(), vec![late]);
  }
}
