use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of the underlying transport.
#[derive(Error, Debug)]
pub enum NetworkError {
  #[error("Network error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("Network unreachable for {0}")]
  Unreachable(String),

  #[error("Request to {url} timed out after {after:?}")]
  Timeout { url: String, after: Duration },

  #[error("Invalid request: {0}")]
  InvalidRequest(String),
}

/// Failures of the persistent cache store.
#[derive(Error, Debug)]
pub enum StorageError {
  #[error("Cache database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("Failed to encode cached headers: {0}")]
  Encoding(#[from] serde_json::Error),

  #[error("Failed to create cache directory {}: {source}", .path.display())]
  CreateDir {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("Could not determine data directory")]
  NoDataDir,

  #[error("Failed to parse cached timestamp '{0}'")]
  Timestamp(String),

  #[error("Only GET requests can be cached, got {0}")]
  UnsupportedMethod(String),

  #[error("Lock poisoned: {0}")]
  Poisoned(String),
}

/// Failure to produce a response for an intercepted request.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error(transparent)]
  Network(#[from] NetworkError),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("{url} is unavailable: the network failed and nothing is cached")]
  TotalUnavailable { url: String },
}

/// Failure of an install or activate event.
#[derive(Error, Debug)]
pub enum LifecycleError {
  #[error("Failed to precache {url}: {reason}")]
  PrecacheFailure { url: String, reason: String },

  #[error(transparent)]
  Storage(#[from] StorageError),
}

/// Any failure surfaced by the worker while handling an event.
#[derive(Error, Debug)]
pub enum WorkerError {
  #[error(transparent)]
  Lifecycle(#[from] LifecycleError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error("Worker stopped before handling the event")]
  Stopped,
}
