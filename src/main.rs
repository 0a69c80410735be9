mod app;
mod config;
mod connectivity;
mod db;
mod http;
mod notify;
mod queue;
mod sync;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::queue::OperationKind;

#[derive(Parser, Debug)]
#[command(name = "stockwise-offline")]
#[command(about = "Offline operation queue, sync and asset cache for StockWise")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/stockwise/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Queue database path (overrides queue.path)
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Queue an operation for the next sync
  Enqueue {
    /// product, sale or purchase
    kind: OperationKind,
    /// Operation payload as JSON
    payload: String,
  },
  /// Print queued operations, one JSON object per line
  List,
  /// Remove every queued operation
  Clear,
  /// Flush the queue to the server once
  Sync,
  /// Monitor connectivity and sync whenever the server becomes reachable again
  Watch,
  /// Asset cache worker
  #[command(subcommand)]
  Worker(WorkerCommand),
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
  /// Fetch the asset manifest into a fresh cache and activate it
  Install,
  /// Route one request through the worker and print the body
  Fetch {
    /// URL or path relative to the server
    url: String,
    /// Accept header to send (use text/html for navigations)
    #[arg(long)]
    accept: Option<String>,
  },
  /// Delete every cache, as on logout
  ClearCaches,
  /// List cache generations (* marks the current version)
  Caches,
}

/// Log to a daily file in the data directory so stdout stays clean.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = db::data_dir()?.join("logs");
  let appender = tracing_appender::rolling::daily(log_dir, "stockwise-offline.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stockwise_offline=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let app = app::App::new(config, args.db)?;

  match args.command {
    Command::Enqueue { kind, payload } => app.enqueue(kind, &payload)?,
    Command::List => app.list()?,
    Command::Clear => app.clear()?,
    Command::Sync => {
      app.sync().await?;
    }
    Command::Watch => app.watch().await?,
    Command::Worker(cmd) => match cmd {
      WorkerCommand::Install => app.worker_install().await?,
      WorkerCommand::Fetch { url, accept } => app.worker_fetch(&url, accept).await?,
      WorkerCommand::ClearCaches => app.worker_clear_caches()?,
      WorkerCommand::Caches => app.worker_caches()?,
    },
  }

  Ok(())
}
