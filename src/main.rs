mod cache;
mod config;
mod error;
mod net;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use cache::{Resolved, ResponseSource, SqliteStorage};
use net::{HttpNetwork, Request};
use worker::{ClientRegistry, EventOutcome, Worker, WorkerEvent};

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "An offline-caching proxy for single-page apps")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache database to use instead of the configured one
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the manifest into the static namespace of the configured version
  Install,
  /// Delete namespaces of other versions and take over open clients
  Activate,
  /// Install, then activate
  Update,
  /// Resolve requests through the worker
  Fetch {
    /// Absolute URLs, or paths relative to the configured origin
    #[arg(required = true)]
    urls: Vec<String>,

    /// Treat the requests as top-level document loads
    #[arg(long)]
    navigate: bool,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,

    /// Write the response body here instead of stdout (single URL only)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Drop stored responses so the next request goes to the network
  Forget {
    /// Absolute URLs, or paths relative to the configured origin
    #[arg(required = true)]
    urls: Vec<String>,
  },
  /// List cache namespaces
  Namespaces,
}

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default: warn). With a log directory, output is
/// also written to a daily-rolling file; keep the returned guard alive until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "shellcache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(file_layer)
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(config.log.dir.as_deref());
  let worker_config = config.worker_config()?;

  let db_path = args.db.clone().or_else(|| config.cache.path.clone());
  let storage = match db_path {
    Some(path) => SqliteStorage::open_at(&path)?,
    None => SqliteStorage::open()?,
  };
  let network = HttpNetwork::new()?;
  let clients = Arc::new(ClientRegistry::new());

  let worker = Arc::new(Worker::new(
    &worker_config,
    Arc::new(storage),
    Arc::new(network),
    clients.clone(),
  ));
  info!(version = worker.version(), "worker ready");

  match args.command {
    Command::Install => install(&worker).await?,
    Command::Activate => activate(&worker).await?,
    Command::Update => {
      install(&worker).await?;
      activate(&worker).await?;
    }
    Command::Fetch {
      urls,
      navigate,
      method,
      output,
    } => {
      let requests = urls
        .iter()
        .map(|u| {
          let url = resolve_url(&worker_config.origin, u)?;
          let request = if navigate {
            Request::navigate(url)
          } else {
            Request::get(url)
          };
          Ok(request.with_method(&method))
        })
        .collect::<Result<Vec<_>>>()?;
      fetch(Arc::clone(&worker), requests, output.as_deref()).await?;
    }
    Command::Forget { urls } => {
      for u in &urls {
        let request = Request::get(resolve_url(&worker_config.origin, u)?);
        let removed = worker.forget(&request)?;
        if removed.is_empty() {
          println!("not cached  {}", request.url);
        } else {
          println!("forgot      {} ({})", request.url, removed.join(", "));
        }
      }
    }
    Command::Namespaces => {
      for ns in worker.namespaces()? {
        let marker = if ns.current { "*" } else { " " };
        println!("{} {:<32} {} entries", marker, ns.name, ns.entries);
      }
    }
  }

  // Let background shell refreshes finish before exiting
  worker.settle().await;

  match clients.controller() {
    Some(version) => info!(version = %version, "controlling version"),
    None if clients.is_waiting_skipped() => {
      info!(version = worker.version(), "installed, takes over on activate")
    }
    None => {}
  }

  Ok(())
}

fn resolve_url(origin: &Url, input: &str) -> Result<Url> {
  origin
    .join(input)
    .map_err(|e| eyre!("Invalid URL '{}': {}", input, e))
}

/// Where a response came from, with the storage time for cached ones.
fn describe_source(resolved: &Resolved) -> String {
  match (resolved.source, resolved.cached_at) {
    (ResponseSource::Network, _) | (_, None) => resolved.source.as_str().to_string(),
    (source, Some(at)) => format!("{} ({})", source.as_str(), at.format("%Y-%m-%d %H:%M:%S")),
  }
}

async fn install(worker: &Worker) -> Result<()> {
  if let EventOutcome::Installed(report) = worker.dispatch(WorkerEvent::Install).await? {
    println!(
      "installed {}: {} precached, {} skipped",
      report.namespace,
      report.stored.len(),
      report.failed.len()
    );
    for miss in &report.failed {
      println!("  skipped {}: {}", miss.url, miss.reason);
    }
  }
  Ok(())
}

async fn activate(worker: &Worker) -> Result<()> {
  if let EventOutcome::Activated(report) = worker.dispatch(WorkerEvent::Activate).await? {
    println!(
      "activated {}: kept {}, deleted {}",
      worker.version(),
      report.kept.len(),
      report.deleted.len()
    );
    for name in &report.deleted {
      println!("  deleted {}", name);
    }
  }
  Ok(())
}

async fn fetch(worker: Arc<Worker>, requests: Vec<Request>, output: Option<&Path>) -> Result<()> {
  if output.is_some() && requests.len() != 1 {
    return Err(eyre!("--output needs exactly one URL"));
  }

  let single = requests.len() == 1;
  let events = worker.start();
  let pending = requests.iter().map(|request| {
    let events = events.clone();
    let event = WorkerEvent::Fetch(request.clone());
    async move { events.send(event).await }
  });
  let outcomes = futures::future::join_all(pending).await;

  let mut failures = 0;
  for (request, outcome) in requests.iter().zip(outcomes) {
    match outcome {
      Ok(EventOutcome::Responded(resolved)) => {
        eprintln!(
          "{} {:<36} {:>8} bytes  {}",
          resolved.response.status,
          describe_source(&resolved),
          resolved.response.body.len(),
          request.url
        );
        match output {
          Some(path) => std::fs::File::create(path)
            .and_then(|mut f| f.write_all(&resolved.response.body))
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
          // A single response goes to stdout so it can be piped
          None if single => std::io::stdout()
            .write_all(&resolved.response.body)
            .map_err(|e| eyre!("Failed to write response body: {}", e))?,
          None => {}
        }
      }
      Ok(other) => return Err(eyre!("Unexpected outcome for {}: {:?}", request.url, other)),
      Err(e) => {
        failures += 1;
        eprintln!("failed {}: {}", request.url, e);
      }
    }
  }

  if failures > 0 {
    return Err(eyre!("{} of {} requests failed", failures, requests.len()));
  }
  Ok(())
}
