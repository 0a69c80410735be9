//! Named response caches and their SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::request::Response;
use crate::db::Database;

/// Trait for cache storage backends, modelled on named cache generations.
pub trait CacheStore: Send + Sync {
  /// Names of all caches, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Store every entry in the named cache, creating it if needed.
  /// Either all entries are written or none are.
  fn put_all(&self, name: &str, entries: &[(String, Response)]) -> Result<()>;

  /// Look a URL up across all caches, oldest cache first.
  fn match_url(&self, url: &str) -> Result<Option<Response>>;

  /// Delete a cache and all its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Version of the worker that last activated, if any.
  fn activated_version(&self) -> Result<Option<String>>;

  /// Record `version` as the active worker. Independent of cache contents.
  fn set_activated(&self, version: &str) -> Result<()>;
}

/// SQLite-backed cache storage.
pub struct SqliteCacheStore {
  db: Database,
}

impl SqliteCacheStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl CacheStore for SqliteCacheStore {
  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare cache query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn put_all(&self, name: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create cache {}: {}", name, e))?;

    for (url, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO cache_entries (cache_name, url, status, headers, body)
         VALUES (?, ?, ?, ?, ?)",
        params![name, url, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store {} in cache {}: {}", url, name, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    debug!(cache = name, entries = entries.len(), "stored cache entries");
    Ok(())
  }

  fn match_url(&self, url: &str) -> Result<Option<Response>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT e.status, e.headers, e.body FROM cache_entries e
         INNER JOIN caches c ON c.name = e.cache_name
         WHERE e.url = ?
         ORDER BY c.rowid
         LIMIT 1",
        params![url],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", url, e))?;

    match row {
      Some((status, headers, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;
        Ok(Some(Response {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    let existed = removed > 0;
    debug!(cache = name, existed, "deleted cache");
    Ok(existed)
  }

  fn activated_version(&self) -> Result<Option<String>> {
    let conn = self.db.conn()?;
    conn
      .query_row("SELECT version FROM worker_state WHERE id = 1", [], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read worker state: {}", e))
  }

  fn set_activated(&self, version: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO worker_state (id, version, activated_at)
         VALUES (1, ?, datetime('now'))",
        params![version],
      )
      .map_err(|e| eyre!("Failed to record active worker {}: {}", version, e))?;
    debug!(version, "recorded active worker");
    Ok(())
  }
}
