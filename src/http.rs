use color_eyre::{eyre::eyre, Result};
use reqwest::Client;

use crate::config::ServerConfig;

/// Shared HTTP client for sync, probes and the cache worker.
pub fn build_client(server: &ServerConfig) -> Result<Client> {
  let mut builder =
    Client::builder().user_agent(concat!("stockwise-offline/", env!("CARGO_PKG_VERSION")));

  if let Some(timeout) = server.timeout() {
    builder = builder.timeout(timeout);
  }

  builder
    .build()
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))
}
