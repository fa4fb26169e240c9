use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::info;

/// Signals to the host about which version controls open pages.
pub trait ClientControl: Send + Sync {
  /// Activate this version as soon as it is installed instead of waiting for
  /// every page of the previous version to close.
  fn skip_waiting(&self, version: &str);

  /// Take control of pages that are already open.
  fn claim(&self, version: &str);
}

/// In-process record of the controlling version.
#[derive(Debug, Default)]
pub struct ClientRegistry {
  skip_waiting: AtomicBool,
  controller: Mutex<Option<String>>,
}

impl ClientRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether an installed version asked to skip the waiting phase.
  pub fn is_waiting_skipped(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Version currently controlling open clients.
  pub fn controller(&self) -> Option<String> {
    self.controller.lock().ok().and_then(|c| c.clone())
  }
}

impl ClientControl for ClientRegistry {
  fn skip_waiting(&self, version: &str) {
    info!(version, "skipping waiting phase");
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  fn claim(&self, version: &str) {
    info!(version, "claiming open clients");
    if let Ok(mut controller) = self.controller.lock() {
      *controller = Some(version.to_string());
    }
  }
}
