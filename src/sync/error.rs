use thiserror::Error;

/// Why a sync attempt did not clear the queue.
///
/// None of these are fatal: the queue stays populated and the next trigger
/// retries the whole batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
  #[error("Queue storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Network failure: {0}")]
  Network(String),

  #[error("Server rejected batch with status {status}")]
  Rejected { status: u16 },
}
