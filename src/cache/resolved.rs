use chrono::{DateTime, Utc};

use crate::net::Response;

use super::storage::CachedResponse;

/// Response produced by a strategy, with metadata about where it came from.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub response: Response,
  pub source: ResponseSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Resolved {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  /// The shell document served in place of the requested resource.
  pub fn shell_fallback(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::ShellFallback,
      cached_at: Some(cached.cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Stored entry for the request itself
  Cache,
  /// Offline, serving the cached app shell as a last resort
  ShellFallback,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::ShellFallback => "shell-fallback",
    }
  }
}
