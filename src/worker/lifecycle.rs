//! Install and activate handling for one deployment version.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{info, warn};
use url::Url;

use crate::cache::{Caches, Namespaces};
use crate::config::PrecachePolicy;
use crate::error::LifecycleError;
use crate::net::{FetchOptions, Network, Request, Response};

use super::clients::ClientControl;

/// A manifest entry that could not be precached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheMiss {
  pub url: String,
  pub reason: String,
}

impl From<PrecacheMiss> for LifecycleError {
  fn from(miss: PrecacheMiss) -> Self {
    LifecycleError::PrecacheFailure {
      url: miss.url,
      reason: miss.reason,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub namespace: String,
  /// Manifest entries now in the static namespace, in manifest order
  pub stored: Vec<Url>,
  /// Entries skipped under the tolerant policy
  pub failed: Vec<PrecacheMiss>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  pub kept: Vec<String>,
  pub deleted: Vec<String>,
}

/// Owns namespace creation, precaching and stale namespace eviction.
pub struct LifecycleManager {
  caches: Caches,
  network: Arc<dyn Network>,
  clients: Arc<dyn ClientControl>,
  namespaces: Namespaces,
  version: String,
  manifest: Vec<Url>,
  policy: PrecachePolicy,
}

impl LifecycleManager {
  pub fn new(
    caches: Caches,
    network: Arc<dyn Network>,
    clients: Arc<dyn ClientControl>,
    version: &str,
    manifest: Vec<Url>,
    policy: PrecachePolicy,
  ) -> Self {
    Self {
      caches,
      network,
      clients,
      namespaces: Namespaces::for_version(version),
      version: version.to_string(),
      manifest,
      policy,
    }
  }

  /// Populate the static namespace from the precache manifest.
  ///
  /// Under [`PrecachePolicy::AllOrNothing`] nothing is written unless every
  /// entry fetched with a 2xx status, and the first failure is returned. A
  /// storage failure while writing also leaves the namespace untouched.
  pub async fn on_install(&self) -> Result<InstallReport, LifecycleError> {
    let namespace = self.namespaces.static_assets.name();
    info!(%namespace, entries = self.manifest.len(), "installing");

    let requests: Vec<Request> = self.manifest.iter().cloned().map(Request::get).collect();

    let (fetched, failed) = match self.policy {
      PrecachePolicy::AllOrNothing => {
        let responses = try_join_all(requests.iter().map(|r| self.precache_one(r)))
          .await
          .map_err(|miss| {
            warn!(%namespace, url = %miss.url, reason = %miss.reason, "precache failed, aborting install");
            LifecycleError::from(miss)
          })?;
        (requests.into_iter().zip(responses).collect::<Vec<_>>(), Vec::new())
      }
      PrecachePolicy::Tolerant => {
        let results = join_all(requests.iter().map(|r| self.precache_one(r))).await;
        let mut fetched = Vec::new();
        let mut failed = Vec::new();
        for (request, result) in requests.into_iter().zip(results) {
          match result {
            Ok(response) => fetched.push((request, response)),
            Err(miss) => {
              warn!(%namespace, url = %miss.url, reason = %miss.reason, "skipping precache entry");
              failed.push(miss);
            }
          }
        }
        (fetched, failed)
      }
    };

    // One batch: the namespace and its entries land together or not at all
    self.caches.handle(&namespace).put_all(&fetched)?;
    let stored: Vec<Url> = fetched.into_iter().map(|(request, _)| request.url).collect();

    info!(%namespace, stored = stored.len(), failed = failed.len(), "installed");
    self.clients.skip_waiting(&self.version);

    Ok(InstallReport {
      namespace,
      stored,
      failed,
    })
  }

  /// Delete every namespace that is not current, then claim open clients.
  pub async fn on_activate(&self) -> Result<ActivateReport, LifecycleError> {
    let mut report = ActivateReport::default();

    for name in self.caches.names()? {
      if self.namespaces.is_current(&name) {
        report.kept.push(name);
        continue;
      }
      self.caches.delete(&name)?;
      info!(namespace = %name, "deleted stale namespace");
      report.deleted.push(name);
    }

    self.clients.claim(&self.version);
    Ok(report)
  }

  async fn precache_one(&self, request: &Request) -> Result<Response, PrecacheMiss> {
    let response = self
      .network
      .fetch(request, FetchOptions::default())
      .await
      .map_err(|e| PrecacheMiss {
        url: request.url.to_string(),
        reason: e.to_string(),
      })?;

    if !response.is_success() {
      return Err(PrecacheMiss {
        url: request.url.to_string(),
        reason: format!("HTTP status {}", response.status),
      });
    }

    Ok(response)
  }
}
