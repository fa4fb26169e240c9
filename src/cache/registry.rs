//! Name-addressed access to cache namespaces.

use std::sync::Arc;

use crate::error::StorageError;
use crate::net::{Request, Response};

use super::key::RequestKey;
use super::storage::{CacheStorage, CachedResponse, EntryWrite};

/// Entry point to every namespace held by a storage backend.
#[derive(Clone)]
pub struct Caches {
  storage: Arc<dyn CacheStorage>,
}

impl Caches {
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self { storage }
  }

  /// Open a namespace, creating it if needed.
  pub fn open(&self, name: &str) -> Result<CacheHandle, StorageError> {
    self.storage.create_namespace(name)?;
    Ok(self.handle(name))
  }

  /// Handle to a namespace without creating it. Reads of a missing namespace
  /// miss; writes create it.
  pub fn handle(&self, name: &str) -> CacheHandle {
    CacheHandle {
      storage: Arc::clone(&self.storage),
      name: name.to_string(),
    }
  }

  /// Every namespace name, oldest first.
  pub fn names(&self) -> Result<Vec<String>, StorageError> {
    self.storage.namespace_names()
  }

  pub fn delete(&self, name: &str) -> Result<bool, StorageError> {
    self.storage.delete_namespace(name)
  }
}

/// One namespace.
#[derive(Clone)]
pub struct CacheHandle {
  storage: Arc<dyn CacheStorage>,
  name: String,
}

impl CacheHandle {
  /// Stored response for this request. Non-GET requests never match.
  pub fn get(&self, request: &Request) -> Result<Option<CachedResponse>, StorageError> {
    if !request.is_get() {
      return Ok(None);
    }
    let key = RequestKey::for_request(request);
    self.storage.get_entry(&self.name, &key.cache_hash())
  }

  /// Insert or replace the entry for this request.
  pub fn put(&self, request: &Request, response: &Response) -> Result<(), StorageError> {
    if !request.is_get() {
      return Err(StorageError::UnsupportedMethod(request.method.clone()));
    }
    let key = RequestKey::for_request(request);
    self
      .storage
      .put_entry(&self.name, &key.cache_hash(), key.description(), response)
  }

  /// Store every pair or none of them.
  pub fn put_all(&self, entries: &[(Request, Response)]) -> Result<(), StorageError> {
    if let Some((request, _)) = entries.iter().find(|(r, _)| !r.is_get()) {
      return Err(StorageError::UnsupportedMethod(request.method.clone()));
    }

    let keys: Vec<(RequestKey, String)> = entries
      .iter()
      .map(|(request, _)| {
        let key = RequestKey::for_request(request);
        let hash = key.cache_hash();
        (key, hash)
      })
      .collect();
    let writes: Vec<EntryWrite<'_>> = keys
      .iter()
      .zip(entries)
      .map(|((key, hash), (_, response))| EntryWrite {
        key: hash,
        request: key.description(),
        response,
      })
      .collect();

    self.storage.put_entries(&self.name, &writes)
  }

  /// Remove the entry for this request. Returns whether one was stored.
  pub fn delete(&self, request: &Request) -> Result<bool, StorageError> {
    let key = RequestKey::for_request(request);
    self.storage.delete_entry(&self.name, &key.cache_hash())
  }

  /// Identities of every stored request, e.g. `GET https://app.example.org/`.
  pub fn keys(&self) -> Result<Vec<String>, StorageError> {
    self.storage.entry_requests(&self.name)
  }
}
