//! Request and response snapshots passed between the router, the cache and the network.

use serde::{Deserialize, Serialize};
use url::Url;

/// Whether a request loads a top-level document or a subresource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level HTML document load
  Navigate,
  #[default]
  Subresource,
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
}

impl Request {
  /// A GET subresource request.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::Subresource,
    }
  }

  /// A GET navigation request.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_ascii_uppercase();
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Method plus URL with any fragment removed.
  ///
  /// Two requests with the same identity share one cache entry.
  pub fn identity(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    format!("{} {}", self.method, url)
  }
}

/// A response snapshot: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_ascii_lowercase(), value.to_string()));
    self
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Per-fetch transport options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
  /// Force revalidation and never reuse a transport-level cached copy.
  pub bypass_cache: bool,
}

impl FetchOptions {
  pub const fn bypass_cache() -> Self {
    Self { bypass_cache: true }
  }
}
