use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::request::Request;
use crate::config::{WorkerConfig, WorkerStrategy};

/// How an intercepted request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Network only; the offline page if the network fails. Never cached.
  NetworkWithFallback,
  /// Cache if present, else network.
  CacheFirst,
  /// Cache, else network, else the offline page (cached navigations).
  CacheFirstWithFallback,
  /// Not intercepted; straight to network.
  Passthrough,
}

/// Interception policy resolved against the server origin.
#[derive(Debug, Clone)]
pub struct Policy {
  version: String,
  strategy: WorkerStrategy,
  origin: Url,
  manifest: Vec<Url>,
  api_prefixes: Vec<String>,
  auth_prefixes: Vec<String>,
}

impl Policy {
  pub fn new(config: &WorkerConfig, origin: Url) -> Result<Self> {
    let paths = match config.strategy {
      WorkerStrategy::AssetOnly => config.assets.iter().collect::<Vec<_>>(),
      WorkerStrategy::Navigation => config.assets.iter().chain(&config.routes).collect(),
    };

    let mut manifest = Vec::with_capacity(paths.len());
    for path in paths {
      let url = origin
        .join(path)
        .map_err(|e| eyre!("Invalid manifest entry {}: {}", path, e))?;
      if !manifest.contains(&url) {
        manifest.push(url);
      }
    }

    Ok(Self {
      version: config.version.clone(),
      strategy: config.strategy,
      origin,
      manifest,
      api_prefixes: config.api_prefixes.clone(),
      auth_prefixes: config.auth_prefixes.clone(),
    })
  }

  /// Name of the current cache generation
  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn strategy(&self) -> WorkerStrategy {
    self.strategy
  }

  /// URLs fetched and cached at install time
  pub fn manifest(&self) -> &[Url] {
    &self.manifest
  }

  pub fn route(&self, request: &Request) -> Route {
    let path = request.path();
    let network_only = self
      .api_prefixes
      .iter()
      .chain(&self.auth_prefixes)
      .any(|prefix| path.starts_with(prefix.as_str()));

    match self.strategy {
      WorkerStrategy::AssetOnly => {
        if network_only || request.accepts_html() {
          Route::NetworkWithFallback
        } else {
          Route::CacheFirst
        }
      }
      WorkerStrategy::Navigation => {
        if network_only {
          Route::NetworkWithFallback
        } else if self.is_manifested(&request.url) {
          if request.accepts_html() {
            Route::CacheFirstWithFallback
          } else {
            Route::CacheFirst
          }
        } else {
          Route::Passthrough
        }
      }
    }
  }

  fn is_manifested(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin() && self.manifest.iter().any(|m| m.path() == url.path())
  }
}
