//! Queue storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde_json::Value;
use tracing::debug;

use super::types::{OperationKind, QueuedOperation};
use crate::db::Database;

/// Trait for queue storage backends.
pub trait QueueStorage: Send + Sync {
  /// Append a new operation. The store assigns the id and timestamp.
  fn enqueue(&self, kind: OperationKind, payload: Value) -> Result<QueuedOperation>;

  /// All queued operations in id order.
  fn read_all(&self) -> Result<Vec<QueuedOperation>>;

  /// Remove every queued operation.
  fn clear_all(&self) -> Result<()>;

  /// Remove the operations up to and including `last_id`, i.e. a snapshot
  /// previously returned by `read_all`. Later operations stay queued.
  /// Returns how many were removed.
  fn remove_through(&self, last_id: i64) -> Result<usize>;
}

/// SQLite-backed queue.
pub struct SqliteQueue {
  db: Database,
}

impl SqliteQueue {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl QueueStorage for SqliteQueue {
  fn enqueue(&self, kind: OperationKind, payload: Value) -> Result<QueuedOperation> {
    let conn = self.db.conn()?;
    let created_at = Utc::now();
    let data =
      serde_json::to_string(&payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    conn
      .execute(
        "INSERT INTO queue (kind, payload, created_at) VALUES (?, ?, ?)",
        params![kind.as_str(), data, created_at.timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to enqueue {} operation: {}", kind, e))?;

    let id = conn.last_insert_rowid();
    debug!(id, %kind, "queued operation");

    Ok(QueuedOperation {
      id,
      kind,
      payload,
      created_at: truncate_to_millis(created_at),
    })
  }

  fn read_all(&self) -> Result<Vec<QueuedOperation>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT id, kind, payload, created_at FROM queue ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
      .map_err(|e| eyre!("Failed to read queue: {}", e))?
      .collect::<rusqlite::Result<Vec<(i64, String, String, i64)>>>()
      .map_err(|e| eyre!("Failed to read queue row: {}", e))?;

    rows
      .into_iter()
      .map(|(id, kind, payload, created_at)| -> Result<QueuedOperation> {
        let kind: OperationKind = kind
          .parse()
          .map_err(|e| eyre!("Corrupt queue record {}: {}", id, e))?;
        let payload: Value = serde_json::from_str(&payload)
          .map_err(|e| eyre!("Corrupt payload in queue record {}: {}", id, e))?;
        let created_at = DateTime::from_timestamp_millis(created_at)
          .ok_or_else(|| eyre!("Corrupt timestamp in queue record {}", id))?;

        Ok(QueuedOperation {
          id,
          kind,
          payload,
          created_at,
        })
      })
      .collect()
  }

  fn clear_all(&self) -> Result<()> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute("DELETE FROM queue", [])
      .map_err(|e| eyre!("Failed to clear queue: {}", e))?;
    debug!(removed, "cleared queue");
    Ok(())
  }

  fn remove_through(&self, last_id: i64) -> Result<usize> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute("DELETE FROM queue WHERE id <= ?", params![last_id])
      .map_err(|e| eyre!("Failed to remove acknowledged operations: {}", e))?;
    debug!(removed, last_id, "removed acknowledged operations");
    Ok(removed)
  }
}

/// Drop sub-millisecond precision so returned records match what is stored.
fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}
