//! Asset cache worker.
//!
//! Serves a fixed, versioned set of static assets from a local cache so pages
//! can load offline, while API, auth and document requests always go to the
//! network with a literal offline page as the fallback.
//!
//! Lifecycle: `Parsed -> Installing -> Installed -> Activating -> Activated`.
//! A failed install leaves the worker `Redundant`. Install skips waiting and
//! activates immediately; activation drops every other cache generation and
//! claims all clients.

mod cache;
mod fetch;
mod policy;
mod request;

pub use cache::{CacheStore, SqliteCacheStore};
pub use fetch::{Fetcher, HttpFetcher};
pub use policy::{Policy, Route};
pub use request::{Request, Response, OFFLINE_PAGE};

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

/// Control message that scrubs every cache (sent on logout).
pub const CLEAR_CACHES: &str = "CLEAR_CACHES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  Redundant,
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Cache,
  Network,
  OfflineFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }
}

/// Messages understood by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
  ClearCaches,
  Unknown(String),
}

impl WorkerMessage {
  pub fn parse(data: &str) -> Self {
    if data == CLEAR_CACHES {
      WorkerMessage::ClearCaches
    } else {
      WorkerMessage::Unknown(data.to_string())
    }
  }
}

pub struct CacheWorker<C: CacheStore, F: Fetcher> {
  policy: Policy,
  cache: C,
  fetcher: F,
  state: WorkerState,
  clients_claimed: bool,
}

impl<C: CacheStore, F: Fetcher> CacheWorker<C, F> {
  pub fn new(policy: Policy, cache: C, fetcher: F) -> Self {
    Self {
      policy,
      cache,
      fetcher,
      state: WorkerState::Parsed,
      clients_claimed: false,
    }
  }

  /// Pick up a worker installed by an earlier run.
  ///
  /// If this version activated before, the worker starts out activated and in
  /// control, even when its caches have since been cleared. Otherwise it
  /// still needs `install`.
  pub fn restore(policy: Policy, cache: C, fetcher: F) -> Result<Self> {
    let mut worker = Self::new(policy, cache, fetcher);
    if worker.cache.activated_version()?.as_deref() == Some(worker.policy.version()) {
      worker.state = WorkerState::Activated;
      worker.clients_claimed = true;
    }
    Ok(worker)
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Whether open pages are routed through this worker
  pub fn controls_clients(&self) -> bool {
    self.clients_claimed
  }

  pub fn policy(&self) -> &Policy {
    &self.policy
  }

  pub fn cache(&self) -> &C {
    &self.cache
  }

  /// Fetch the manifest into the current cache generation, then activate.
  ///
  /// All-or-nothing: if any manifest entry fails to fetch or answers with a
  /// non-success status, nothing is stored and the worker becomes redundant.
  pub async fn install(&mut self) -> Result<()> {
    self.state = WorkerState::Installing;
    info!(version = self.policy.version(), assets = self.policy.manifest().len(), "installing");

    let fetcher = &self.fetcher;
    let fetches = self.policy.manifest().iter().map(|url| {
      let request = Request::get(url.clone());
      async move {
        let response = fetcher.fetch(&request).await?;
        if !response.is_success() {
          return Err(eyre!("Fetching {} returned status {}", url, response.status));
        }
        Ok::<_, color_eyre::Report>((url.to_string(), response))
      }
    });

    let stored = match try_join_all(fetches).await {
      Ok(entries) => self.cache.put_all(self.policy.version(), &entries),
      Err(e) => Err(e),
    };

    if let Err(e) = stored {
      warn!(error = %e, "install failed");
      self.state = WorkerState::Redundant;
      return Err(e);
    }

    self.state = WorkerState::Installed;
    // Skip waiting: take over without letting older workers finish
    self.activate()
  }

  /// Delete every cache generation but the current one and claim all clients.
  pub fn activate(&mut self) -> Result<()> {
    if self.state != WorkerState::Installed {
      return Err(eyre!("Cannot activate worker in state {:?}", self.state));
    }
    self.state = WorkerState::Activating;

    for key in self.cache.keys()? {
      if key != self.policy.version() {
        self.cache.delete(&key)?;
        info!(cache = %key, "deleted stale cache");
      }
    }

    self.cache.set_activated(self.policy.version())?;
    self.clients_claimed = true;
    self.state = WorkerState::Activated;
    info!(version = self.policy.version(), "activated");
    Ok(())
  }

  /// Answer an intercepted request.
  ///
  /// `Err` is a network error surfaced to the page, which only happens for
  /// routes without an offline fallback.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served> {
    if !self.clients_claimed {
      // Not in control yet: the page talks to the network directly
      return self.network(request).await;
    }

    let route = self.policy.route(request);
    debug!(url = %request.url, ?route, "intercepted");

    match route {
      Route::NetworkWithFallback => Ok(self.network_or_offline(request).await),
      Route::CacheFirst => match self.cached(request) {
        Some(response) => Ok(Served::new(response, ResponseSource::Cache)),
        None => self.network(request).await,
      },
      Route::CacheFirstWithFallback => match self.cached(request) {
        Some(response) => Ok(Served::new(response, ResponseSource::Cache)),
        None => Ok(self.network_or_offline(request).await),
      },
      Route::Passthrough => self.network(request).await,
    }
  }

  /// Handle a control message. Returns whether it was understood.
  pub fn handle_message(&self, data: &str) -> Result<bool> {
    match WorkerMessage::parse(data) {
      WorkerMessage::ClearCaches => {
        let keys = self.cache.keys()?;
        for key in &keys {
          self.cache.delete(key)?;
        }
        info!(deleted = keys.len(), "cleared all caches");
        Ok(true)
      }
      WorkerMessage::Unknown(other) => {
        debug!(message = %other, "ignoring unknown message");
        Ok(false)
      }
    }
  }

  fn cached(&self, request: &Request) -> Option<Response> {
    match self.cache.match_url(request.url.as_str()) {
      Ok(hit) => hit,
      Err(e) => {
        // Treat an unreadable cache as a miss
        warn!(error = %e, url = %request.url, "cache lookup failed");
        None
      }
    }
  }

  async fn network(&self, request: &Request) -> Result<Served> {
    let response = self.fetcher.fetch(request).await?;
    Ok(Served::new(response, ResponseSource::Network))
  }

  async fn network_or_offline(&self, request: &Request) -> Served {
    match self.fetcher.fetch(request).await {
      Ok(response) => Served::new(response, ResponseSource::Network),
      Err(e) => {
        debug!(error = %e, url = %request.url, "network unavailable, serving offline page");
        Served::new(Response::offline_page(), ResponseSource::OfflineFallback)
      }
    }
  }
}
