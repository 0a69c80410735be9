use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::queue::{OperationKind, QueuedOperation};

/// Request body for the sync endpoint: raw payloads grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
  pub products: Vec<Value>,
  pub sales: Vec<Value>,
  pub purchases: Vec<Value>,
}

impl SyncBatch {
  /// Group operations by kind, keeping queue order within each kind.
  /// Ids and timestamps are not sent.
  pub fn from_operations(operations: &[QueuedOperation]) -> Self {
    let mut batch = Self::default();
    for op in operations {
      let target = match op.kind {
        OperationKind::Product => &mut batch.products,
        OperationKind::Sale => &mut batch.sales,
        OperationKind::Purchase => &mut batch.purchases,
      };
      target.push(op.payload.clone());
    }
    batch
  }

  pub fn len(&self) -> usize {
    self.products.len() + self.sales.len() + self.purchases.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Identifier for a set of queued operations, sent as the idempotency key.
///
/// Derived from record ids and timestamps only, so resubmitting the same
/// unacknowledged records yields the same key.
pub fn batch_id(operations: &[QueuedOperation]) -> String {
  let mut hasher = Sha256::new();
  for op in operations {
    hasher.update(op.id.to_be_bytes());
    hasher.update(op.created_at.timestamp_millis().to_be_bytes());
  }
  hex::encode(hasher.finalize())
}
