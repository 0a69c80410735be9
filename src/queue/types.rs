use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of a queued operation. Determines which batch it is submitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
  Product,
  Sale,
  Purchase,
}

impl OperationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      OperationKind::Product => "product",
      OperationKind::Sale => "sale",
      OperationKind::Purchase => "purchase",
    }
  }
}

impl fmt::Display for OperationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OperationKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "product" | "products" => Ok(OperationKind::Product),
      "sale" | "sales" => Ok(OperationKind::Sale),
      "purchase" | "purchases" => Ok(OperationKind::Purchase),
      other => Err(format!("unknown operation kind: {}", other)),
    }
  }
}

/// A single operation waiting to be synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
  /// Store-assigned, unique and increasing
  pub id: i64,
  pub kind: OperationKind,
  /// Opaque record forwarded to the server as-is
  pub payload: Value,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub created_at: DateTime<Utc>,
}
