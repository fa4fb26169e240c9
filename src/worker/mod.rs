//! The offline worker for one deployment version.
//!
//! A [`Worker`] is built once with its storage, network and client-control
//! dependencies, then receives `install`, `activate` and `fetch` events either
//! directly through [`Worker::dispatch`] or through the event loop started by
//! [`Worker::start`].

mod clients;
mod event;
mod lifecycle;
mod router;

use std::sync::Arc;

use crate::cache::{CacheStorage, Caches, Namespaces, StrategyEngine};
use crate::config::WorkerConfig;
use crate::error::{StorageError, WorkerError};
use crate::net::{Network, Request, TimeoutNetwork};

pub use clients::{ClientControl, ClientRegistry};
pub use event::{EventOutcome, EventSender, WorkerEvent};
use lifecycle::LifecycleManager;
use router::Router;

/// Namespace listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSummary {
  pub name: String,
  pub entries: usize,
  /// Belongs to the worker's version
  pub current: bool,
}

pub struct Worker {
  version: String,
  caches: Caches,
  namespaces: Namespaces,
  lifecycle: LifecycleManager,
  router: Router,
}

impl Worker {
  pub fn new(
    config: &WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<dyn ClientControl>,
  ) -> Self {
    let network: Arc<dyn Network> = match config.fetch_timeout {
      Some(limit) => Arc::new(TimeoutNetwork::new(network, limit)),
      None => network,
    };

    let caches = Caches::new(storage);
    let namespaces = Namespaces::for_version(&config.version);

    let engine = StrategyEngine::new(
      caches.clone(),
      Arc::clone(&network),
      namespaces.clone(),
      config.shell.clone(),
    );
    let router = Router::new(
      engine,
      namespaces.clone(),
      &config.origin,
      config.remote_feed.clone(),
    );
    let lifecycle = LifecycleManager::new(
      caches.clone(),
      network,
      clients,
      &config.version,
      config.precache.clone(),
      config.precache_policy,
    );

    Self {
      version: config.version.clone(),
      caches,
      namespaces,
      lifecycle,
      router,
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// Handle one event to completion.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
    match event {
      WorkerEvent::Install => Ok(EventOutcome::Installed(self.lifecycle.on_install().await?)),
      WorkerEvent::Activate => Ok(EventOutcome::Activated(
        self.lifecycle.on_activate().await?,
      )),
      WorkerEvent::Fetch(request) => Ok(EventOutcome::Responded(
        self.router.handle(&request).await?,
      )),
    }
  }

  /// Run the worker behind an event loop.
  pub fn start(self: Arc<Self>) -> EventSender {
    event::spawn(self)
  }

  /// Wait for background shell refreshes to land.
  pub async fn settle(&self) {
    self.router.settle().await;
  }

  /// Drop the stored entry for a request from both current namespaces.
  ///
  /// Returns the namespaces that held one. The next request for it goes back
  /// to the network.
  pub fn forget(&self, request: &Request) -> Result<Vec<String>, StorageError> {
    let mut removed = Vec::new();
    for namespace in [&self.namespaces.static_assets, &self.namespaces.runtime] {
      let name = namespace.name();
      if self.caches.handle(&name).delete(request)? {
        removed.push(name);
      }
    }
    Ok(removed)
  }

  /// Every namespace in storage with its entry count.
  pub fn namespaces(&self) -> Result<Vec<NamespaceSummary>, StorageError> {
    self
      .caches
      .names()?
      .into_iter()
      .map(|name| {
        let entries = self.caches.open(&name)?.keys()?.len();
        Ok(NamespaceSummary {
          current: self.namespaces.is_current(&name),
          name,
          entries,
        })
      })
      .collect()
  }
}
