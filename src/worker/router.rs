//! Per-request classification and strategy dispatch.

use tracing::debug;
use url::{Origin, Url};

use crate::cache::{Namespaces, Resolved, StrategyEngine};
use crate::error::FetchError;
use crate::net::Request;

/// Resource class of an intercepted request. Classes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Top-level document load, served from the app shell
  Navigation,
  /// The designated remote data feed
  RemoteFeed,
  /// Same scheme, host and port as the app
  SameOrigin,
  /// Third-party or CDN resource
  CrossOrigin,
}

impl RequestClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Navigation => "navigation",
      Self::RemoteFeed => "remote-feed",
      Self::SameOrigin => "same-origin",
      Self::CrossOrigin => "cross-origin",
    }
  }
}

/// Routes each request to the strategy for its class.
pub struct Router {
  engine: StrategyEngine,
  namespaces: Namespaces,
  origin: Origin,
  remote_feed: Url,
}

impl Router {
  pub fn new(engine: StrategyEngine, namespaces: Namespaces, app_url: &Url, remote_feed: Url) -> Self {
    Self {
      engine,
      namespaces,
      origin: app_url.origin(),
      remote_feed,
    }
  }

  /// First match wins: navigation, remote feed, same origin, everything else.
  pub fn classify(&self, request: &Request) -> RequestClass {
    if request.is_navigation() {
      RequestClass::Navigation
    } else if request.url == self.remote_feed {
      RequestClass::RemoteFeed
    } else if request.url.origin() == self.origin {
      RequestClass::SameOrigin
    } else {
      RequestClass::CrossOrigin
    }
  }

  pub async fn handle(&self, request: &Request) -> Result<Resolved, FetchError> {
    let class = self.classify(request);
    debug!(url = %request.url, method = %request.method, class = class.as_str(), "routing");

    let runtime = &self.namespaces.runtime;
    match class {
      RequestClass::Navigation => self.engine.shell_first(request).await,
      RequestClass::RemoteFeed => self.engine.network_first(request, runtime).await,
      RequestClass::SameOrigin => self.engine.cache_first(request, runtime).await,
      RequestClass::CrossOrigin => self.engine.network_first(request, runtime).await,
    }
  }

  /// Wait for background work started while handling requests.
  pub async fn settle(&self) {
    self.engine.settle().await;
  }
}
