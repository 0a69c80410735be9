//! Persistent queue of operations recorded while the server is unreachable.
//!
//! Records are appended by `enqueue`, read back in id order, and removed only
//! all at once after the server has acknowledged a sync.

mod store;
mod types;

pub use store::{QueueStorage, SqliteQueue};
pub use types::{OperationKind, QueuedOperation};
