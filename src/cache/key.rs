//! Storage keys for cached requests.

use sha2::{Digest, Sha256};

use crate::net::Request;

/// Fixed-length key derived from a request's identity (method + URL).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestKey {
  identity: String,
}

impl RequestKey {
  pub fn for_request(request: &Request) -> Self {
    Self {
      identity: request.identity(),
    }
  }

  /// SHA256 of the identity, hex encoded.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.identity.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human readable form, e.g. `GET https://app.example.org/app.js`.
  pub fn description(&self) -> &str {
    &self.identity
  }
}
