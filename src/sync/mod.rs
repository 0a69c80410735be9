//! Flushing the operation queue to the server.
//!
//! - Reads every queued operation and groups payloads by kind
//! - Submits the grouped batch as a single `POST`
//! - Removes exactly the submitted operations when the server answers with a
//!   success status; anything queued meanwhile waits for the next attempt
//! - Leaves the queue untouched on any failure, so the next attempt resubmits it

mod batch;
mod client;
mod error;
mod transport;

pub use client::{SyncClient, SyncOutcome};
pub use error::SyncError;
pub use transport::HttpTransport;
