//! Resolution strategies over the cache store and the network.
//!
//! Each strategy is an ordered chain of [`Step`]s. Steps run in order until one
//! yields a response; a miss moves on to the next step, and so does a failure.
//! When the chain runs out, the failure of the final step propagates, or
//! [`FetchError::TotalUnavailable`] if the final step was a miss.

use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, StorageError};
use crate::net::{FetchOptions, Network, Request, Response};

use super::namespace::{Namespace, Namespaces};
use super::registry::Caches;
use super::resolved::Resolved;
use super::storage::CachedResponse;

/// One step of a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
  /// Look the request up in the strategy's namespace
  Lookup,
  /// Look the request up in the strategy's namespace, then in every other current one
  LookupAnyCurrent,
  /// Fetch from the network, storing a copy in the runtime namespace
  Fetch(FetchOptions),
  /// Serve the cached shell document
  Shell,
}

const CACHE_FIRST: &[Step] = &[
  Step::LookupAnyCurrent,
  Step::Fetch(FetchOptions {
    bypass_cache: false,
  }),
];

const NETWORK_FIRST: &[Step] = &[
  Step::Fetch(FetchOptions::bypass_cache()),
  Step::Lookup,
  Step::Shell,
];

/// Every fetch of the shell document, live or background, bypasses transport caches.
const SHELL_FETCH: FetchOptions = FetchOptions::bypass_cache();

/// Cache-first, network-first and shell resolution for one active version.
#[derive(Clone)]
pub struct StrategyEngine {
  caches: Caches,
  network: Arc<dyn Network>,
  namespaces: Namespaces,
  /// GET request for the app shell document
  shell: Request,
  /// Background shell refreshes still in flight
  refreshes: Arc<Mutex<JoinSet<()>>>,
}

impl StrategyEngine {
  pub fn new(
    caches: Caches,
    network: Arc<dyn Network>,
    namespaces: Namespaces,
    shell_url: Url,
  ) -> Self {
    Self {
      caches,
      network,
      namespaces,
      shell: Request::get(shell_url),
      refreshes: Arc::new(Mutex::new(JoinSet::new())),
    }
  }

  /// Serve from cache when present, otherwise fetch and keep a runtime copy.
  ///
  /// A network failure on a miss propagates; there is no offline fallback.
  pub async fn cache_first(
    &self,
    request: &Request,
    namespace: &Namespace,
  ) -> Result<Resolved, FetchError> {
    self.run(CACHE_FIRST, request, namespace).await
  }

  /// Fetch bypassing transport caches, falling back to the namespace entry and
  /// then to the cached shell document.
  pub async fn network_first(
    &self,
    request: &Request,
    namespace: &Namespace,
  ) -> Result<Resolved, FetchError> {
    self.run(NETWORK_FIRST, request, namespace).await
  }

  /// Navigation variant: cached shell first with a background refresh.
  ///
  /// 1. Shell cached - return it and refresh it from the network in the background
  /// 2. Shell missing - fetch the document and store it as the new shell baseline
  /// 3. Fetch failed - serve whatever shell is cached by now
  pub async fn shell_first(&self, request: &Request) -> Result<Resolved, FetchError> {
    let static_assets = &self.namespaces.static_assets;

    match self.lookup(static_assets, &self.shell) {
      Ok(Some(cached)) => {
        debug!(url = %request.url, "shell hit");
        self.spawn_shell_refresh(request.clone());
        return Ok(Resolved::from_cache(cached));
      }
      Ok(None) => debug!(url = %request.url, "shell miss"),
      Err(e) => warn!(url = %request.url, error = %e, "shell lookup failed"),
    }

    match self.network.fetch(request, SHELL_FETCH).await {
      Ok(response) => {
        if request.is_get() {
          self.store(static_assets, &self.shell, &response);
        }
        Ok(Resolved::from_network(response))
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "navigation fetch failed, trying cached shell");
        match self.lookup(static_assets, &self.shell)? {
          Some(cached) => Ok(Resolved::shell_fallback(cached)),
          None => Err(FetchError::TotalUnavailable {
            url: request.url.to_string(),
          }),
        }
      }
    }
  }

  /// Wait for every background refresh started so far.
  pub async fn settle(&self) {
    let mut pending = match self.refreshes.lock() {
      Ok(mut set) => std::mem::take(&mut *set),
      Err(e) => {
        warn!(error = %e, "refresh tracker poisoned");
        return;
      }
    };

    while let Some(result) = pending.join_next().await {
      if let Err(e) = result {
        warn!(error = %e, "background refresh task failed");
      }
    }
  }

  async fn run(
    &self,
    steps: &[Step],
    request: &Request,
    namespace: &Namespace,
  ) -> Result<Resolved, FetchError> {
    let mut last_error = None;

    for step in steps {
      match self.step(*step, request, namespace).await {
        Ok(Some(resolved)) => {
          debug!(?step, url = %request.url, source = resolved.source.as_str(), "resolved");
          return Ok(resolved);
        }
        Ok(None) => {
          debug!(?step, url = %request.url, "miss");
          last_error = None;
        }
        Err(e) => {
          warn!(?step, url = %request.url, error = %e, "step failed");
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| FetchError::TotalUnavailable {
      url: request.url.to_string(),
    }))
  }

  async fn step(
    &self,
    step: Step,
    request: &Request,
    namespace: &Namespace,
  ) -> Result<Option<Resolved>, FetchError> {
    match step {
      Step::Lookup => Ok(self.lookup(namespace, request)?.map(Resolved::from_cache)),
      Step::LookupAnyCurrent => {
        if let Some(cached) = self.lookup(namespace, request)? {
          return Ok(Some(Resolved::from_cache(cached)));
        }
        for other in [&self.namespaces.static_assets, &self.namespaces.runtime] {
          if other == namespace {
            continue;
          }
          if let Some(cached) = self.lookup(other, request)? {
            return Ok(Some(Resolved::from_cache(cached)));
          }
        }
        Ok(None)
      }
      Step::Fetch(options) => {
        let response = self.network.fetch(request, options).await?;
        self.store(&self.namespaces.runtime, request, &response);
        Ok(Some(Resolved::from_network(response)))
      }
      Step::Shell => Ok(
        self
          .lookup(&self.namespaces.static_assets, &self.shell)?
          .map(Resolved::shell_fallback),
      ),
    }
  }

  fn lookup(
    &self,
    namespace: &Namespace,
    request: &Request,
  ) -> Result<Option<CachedResponse>, StorageError> {
    self.caches.handle(&namespace.name()).get(request)
  }

  /// Keep a copy of a successful GET response. Write failures are logged, not returned.
  fn store(&self, namespace: &Namespace, request: &Request, response: &Response) {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "not caching non-GET request");
      return;
    }
    if !response.is_success() {
      debug!(status = response.status, url = %request.url, "not caching unsuccessful response");
      return;
    }

    if let Err(e) = self.caches.handle(&namespace.name()).put(request, response) {
      warn!(%namespace, url = %request.url, error = %e, "failed to store response");
    }
  }

  fn spawn_shell_refresh(&self, request: Request) {
    let engine = self.clone();
    let task = async move {
      match engine
        .network
        .fetch(&request, SHELL_FETCH)
        .await
      {
        Ok(response) => {
          if request.is_get() {
            engine.store(&engine.namespaces.static_assets, &engine.shell, &response);
          }
          debug!(url = %request.url, status = response.status, "shell refreshed");
        }
        Err(e) => debug!(url = %request.url, error = %e, "shell refresh failed"),
      }
    };

    match self.refreshes.lock() {
      Ok(mut set) => {
        // Reap refreshes that already finished
        while set.try_join_next().is_some() {}
        set.spawn(task);
      }
      Err(e) => warn!(error = %e, "refresh tracker poisoned, skipping shell refresh"),
    }
  }
}
