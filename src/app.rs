use crate::config::Config;
use crate::connectivity::{probe_http, ConnectivityMonitor};
use crate::db::{self, Database};
use crate::http::build_client;
use crate::notify::{
  sync_toast, update_badge, Notifier, TerminalBadge, TerminalNotifier, Toast, ToastKind,
};
use crate::queue::{OperationKind, QueueStorage, SqliteQueue};
use crate::sync::{HttpTransport, SyncClient, SyncOutcome};
use crate::worker::{
  CacheStore, CacheWorker, HttpFetcher, Policy, Request, SqliteCacheStore, CLEAR_CACHES,
};
use color_eyre::{eyre::eyre, Result};
use reqwest::Client;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Wires configuration, storage and network together for each command
pub struct App {
  config: Config,
  /// Overrides `queue.path` from the config
  queue_path: Option<PathBuf>,
  client: Client,
}

impl App {
  pub fn new(config: Config, queue_path: Option<PathBuf>) -> Result<Self> {
    let client = build_client(&config.server)?;
    Ok(Self {
      config,
      queue_path,
      client,
    })
  }

  fn open_queue(&self) -> Result<Arc<SqliteQueue>> {
    let path = self
      .queue_path
      .clone()
      .or_else(|| self.config.queue.path.clone());
    let db = Database::open(path.as_deref())?;
    Ok(Arc::new(SqliteQueue::new(db)))
  }

  fn sync_client(&self) -> Result<SyncClient<SqliteQueue, HttpTransport>> {
    let transport = HttpTransport::new(
      self.client.clone(),
      self.config.server.sync_endpoint()?,
      Config::get_api_token(),
    );
    info!(endpoint = %transport.endpoint(), "sync endpoint");
    Ok(SyncClient::new(self.open_queue()?, transport))
  }

  fn open_worker(&self) -> Result<CacheWorker<SqliteCacheStore, HttpFetcher>> {
    let path = match &self.config.worker.cache_path {
      Some(p) => p.clone(),
      None => db::data_dir()?.join("cache.db"),
    };
    let cache = SqliteCacheStore::new(Database::open(Some(path.as_path()))?);
    let policy = Policy::new(&self.config.worker, self.config.server.base_url()?)?;
    CacheWorker::restore(policy, cache, HttpFetcher::new(self.client.clone()))
  }

  pub fn enqueue(&self, kind: OperationKind, payload: &str) -> Result<()> {
    let payload: Value =
      serde_json::from_str(payload).map_err(|e| eyre!("Payload is not valid JSON: {}", e))?;

    let op = self.open_queue()?.enqueue(kind, payload)?;
    print_json(&op)?;

    TerminalNotifier::stderr().notify(
      Toast::new("Saved offline", ToastKind::Ok)
        .with_message(format!("{} #{} will sync later", kind, op.id)),
    );
    Ok(())
  }

  pub fn list(&self) -> Result<()> {
    for op in self.open_queue()?.read_all()? {
      print_json(&op)?;
    }
    Ok(())
  }

  pub fn clear(&self) -> Result<()> {
    self.open_queue()?.clear_all()?;
    info!("queue cleared by user");
    Ok(())
  }

  /// Explicit sync. Failures are reported, not returned as errors.
  pub async fn sync(&self) -> Result<SyncOutcome> {
    let outcome = self.sync_client()?.sync_now().await;
    report(&mut TerminalNotifier::stderr(), &outcome);
    Ok(outcome)
  }

  /// Watch connectivity until interrupted, syncing on every reconnect.
  pub async fn watch(&self) -> Result<()> {
    let client = self.sync_client()?;
    let probe_url = self.config.server.resolve(&self.config.connectivity.probe_path)?;
    let http = self.client.clone();
    let interval = self.config.connectivity.interval();

    // Each probe is bounded by the interval
    let mut monitor = ConnectivityMonitor::spawn(interval, move || {
      let http = http.clone();
      let url = probe_url.clone();
      async move { probe_http(&http, url, interval).await }
    });

    let mut badge = TerminalBadge::stderr();
    let mut notifier = TerminalNotifier::stderr();
    info!(?interval, "watching connectivity");

    loop {
      tokio::select! {
        transition = monitor.next() => {
          let Some(transition) = transition else { break };
          update_badge(&mut badge, transition.to);
          if transition.is_reconnect() {
            info!("back online, syncing");
            let outcome = client.sync_now().await;
            report(&mut notifier, &outcome);
          }
        }
        _ = tokio::signal::ctrl_c() => {
          info!("interrupted");
          break;
        }
      }
    }

    Ok(())
  }

  pub async fn worker_install(&self) -> Result<()> {
    let mut worker = self.open_worker()?;
    worker.install().await?;
    println!(
      "{:?} {} ({} entries, {:?})",
      worker.state(),
      worker.policy().version(),
      worker.policy().manifest().len(),
      worker.policy().strategy()
    );
    Ok(())
  }

  pub async fn worker_fetch(&self, target: &str, accept: Option<String>) -> Result<()> {
    let worker = self.open_worker()?;
    let mut request = Request::get(self.config.server.resolve(target)?);
    if let Some(accept) = accept {
      request = request.with_accept(accept);
    }

    let served = worker.handle_fetch(&request).await?;
    info!(url = %request.url, source = ?served.source, status = served.response.status, "served");
    eprintln!("{} ({:?})", served.response.status, served.source);

    std::io::stdout()
      .write_all(&served.response.body)
      .map_err(|e| eyre!("Failed to write response body: {}", e))?;
    Ok(())
  }

  pub fn worker_clear_caches(&self) -> Result<()> {
    self.open_worker()?.handle_message(CLEAR_CACHES)?;
    Ok(())
  }

  pub fn worker_caches(&self) -> Result<()> {
    let worker = self.open_worker()?;
    for key in worker.cache().keys()? {
      let marker = if key == worker.policy().version() { "*" } else { " " };
      println!("{} {}", marker, key);
    }
    Ok(())
  }
}

fn report(notifier: &mut impl Notifier, outcome: &SyncOutcome) {
  match outcome {
    SyncOutcome::NothingQueued => eprintln!("nothing to sync"),
    SyncOutcome::AlreadyRunning => eprintln!("sync already in progress"),
    _ => {}
  }
  if let Some(toast) = sync_toast(outcome) {
    notifier.notify(toast);
  }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  let line = serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize: {}", e))?;
  println!("{}", line);
  Ok(())
}
