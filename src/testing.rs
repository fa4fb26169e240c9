//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::NetworkError;
use crate::net::{FetchOptions, Network, Request, Response};

/// Scripted network with a call counter.
///
/// Unrouted URLs answer 404. Routes are keyed by URL without fragment.
#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  hanging: AtomicBool,
  calls: AtomicUsize,
  seen: Mutex<Vec<(String, FetchOptions)>>,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn set_hanging(&self, hanging: bool) {
    self.hanging.store(hanging, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// URLs and options of every fetch so far, in call order.
  pub fn seen(&self) -> Vec<(String, FetchOptions)> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request, options: FetchOptions) -> Result<Response, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let mut url = request.url.clone();
    url.set_fragment(None);
    let url = url.to_string();
    self.seen.lock().unwrap().push((url.clone(), options));

    if self.hanging.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    if self.offline.load(Ordering::SeqCst) {
      return Err(NetworkError::Unreachable(url));
    }

    let routes = self.routes.lock().unwrap();
    Ok(
      routes
        .get(&url)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}
