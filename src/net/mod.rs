//! Outbound network access.
//!
//! The worker only sees the [`Network`] trait; [`HttpNetwork`] is the
//! `reqwest`-backed transport used by the binary.

mod client;
mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::NetworkError;

pub use client::HttpNetwork;
pub use types::{FetchOptions, Request, Response};

/// Outbound fetch used for precaching and for every network step of a strategy.
///
/// Any response the remote returns, including 4xx/5xx, is `Ok`. `Err` means no
/// response arrived at all (connectivity loss, DNS failure, timeout).
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request, options: FetchOptions) -> Result<Response, NetworkError>;
}

/// Bounds every fetch of the wrapped network by a fixed latency budget.
pub struct TimeoutNetwork {
  inner: Arc<dyn Network>,
  limit: Duration,
}

impl TimeoutNetwork {
  pub fn new(inner: Arc<dyn Network>, limit: Duration) -> Self {
    Self { inner, limit }
  }
}

#[async_trait]
impl Network for TimeoutNetwork {
  async fn fetch(&self, request: &Request, options: FetchOptions) -> Result<Response, NetworkError> {
    match tokio::time::timeout(self.limit, self.inner.fetch(request, options)).await {
      Ok(result) => result,
      Err(_) => Err(NetworkError::Timeout {
        url: request.url.to_string(),
        after: self.limit,
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MockNetwork;
  use url::Url;

  #[tokio::test]
  async fn test_timeout_fires_on_hanging_fetch() {
    let mock = Arc::new(MockNetwork::new());
    mock.set_hanging(true);
    let network = TimeoutNetwork::new(mock.clone(), Duration::from_millis(20));

    let request = Request::get(Url::parse("https://cdn.example.net/lib.js").unwrap());
    let err = network
      .fetch(&request, FetchOptions::default())
      .await
      .unwrap_err();

    assert!(matches!(err, NetworkError::Timeout { .. }));
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_timeout_passes_through_fast_fetch() {
    let mock = Arc::new(MockNetwork::new());
    mock.route("https://cdn.example.net/lib.js", Response::new(200, "lib"));
    let network = TimeoutNetwork::new(mock, Duration::from_secs(5));

    let request = Request::get(Url::parse("https://cdn.example.net/lib.js").unwrap());
    let res = network
      .fetch(&request, FetchOptions::default())
      .await
      .unwrap();

    assert_eq!(res.body, b"lib");
  }
}
