//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;
use crate::net::Response;

/// A stored response and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  /// Informational only, entries never expire on their own
  pub cached_at: DateTime<Utc>,
}

/// One entry of a batch write.
#[derive(Debug, Clone, Copy)]
pub struct EntryWrite<'a> {
  pub key: &'a str,
  /// Human readable identity, e.g. `GET https://app.example.org/`
  pub request: &'a str,
  pub response: &'a Response,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named namespaces, each a map from request key
/// to response. Writing into a namespace that does not exist creates it.
pub trait CacheStorage: Send + Sync {
  /// Create the namespace if it does not exist yet.
  fn create_namespace(&self, name: &str) -> Result<(), StorageError>;

  /// All namespace names, oldest first.
  fn namespace_names(&self) -> Result<Vec<String>, StorageError>;

  /// Drop a namespace and every entry in it. Returns whether it existed.
  fn delete_namespace(&self, name: &str) -> Result<bool, StorageError>;

  fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>, StorageError>;

  /// Insert or replace one entry. `request` is the human readable identity.
  fn put_entry(
    &self,
    namespace: &str,
    key: &str,
    request: &str,
    response: &Response,
  ) -> Result<(), StorageError>;

  /// Create the namespace and write every entry, or write nothing at all.
  fn put_entries(&self, namespace: &str, entries: &[EntryWrite<'_>]) -> Result<(), StorageError>;

  fn delete_entry(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;

  /// Identities of the requests stored in a namespace.
  fn entry_requests(&self, namespace: &str) -> Result<Vec<String>, StorageError>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at the default location.
  pub fn open() -> Result<Self, StorageError> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the cache database at `path`.
  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    Self::from_connection(Connection::open(path)?)
  }

  /// A private, non-persistent database.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  /// `$XDG_DATA_HOME/shellcache/cache.db`, or the `~/.local/share` equivalent.
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StorageError::NoDataDir)?;

    Ok(data_dir.join("shellcache").join("cache.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self
      .conn
      .lock()
      .map_err(|e| StorageError::Poisoned(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS entries (
    namespace TEXT NOT NULL,
    request_key TEXT NOT NULL,
    request TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace, request_key),
    FOREIGN KEY (namespace) REFERENCES namespaces(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_namespace ON entries(namespace);
"#;

impl CacheStorage for SqliteStorage {
  fn create_namespace(&self, name: &str) -> Result<(), StorageError> {
    self.conn()?.execute(
      "INSERT OR IGNORE INTO namespaces (name) VALUES (?)",
      params![name],
    )?;
    Ok(())
  }

  fn namespace_names(&self) -> Result<Vec<String>, StorageError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY rowid")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_namespace(&self, name: &str) -> Result<bool, StorageError> {
    let conn = self.conn()?;
    conn.execute("DELETE FROM entries WHERE namespace = ?", params![name])?;
    let removed = conn.execute("DELETE FROM namespaces WHERE name = ?", params![name])?;
    Ok(removed > 0)
  }

  fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>, StorageError> {
    let conn = self.conn()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE namespace = ? AND request_key = ?",
        params![namespace, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_entry(
    &self,
    namespace: &str,
    key: &str,
    request: &str,
    response: &Response,
  ) -> Result<(), StorageError> {
    let conn = self.conn()?;
    insert_namespace(&conn, namespace)?;
    insert_entry(
      &conn,
      namespace,
      &EntryWrite {
        key,
        request,
        response,
      },
    )
  }

  fn put_entries(&self, namespace: &str, entries: &[EntryWrite<'_>]) -> Result<(), StorageError> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    insert_namespace(&tx, namespace)?;
    for entry in entries {
      insert_entry(&tx, namespace, entry)?;
    }

    // Dropping the transaction on an early return rolls everything back
    tx.commit()?;
    Ok(())
  }

  fn delete_entry(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
    let removed = self.conn()?.execute(
      "DELETE FROM entries WHERE namespace = ? AND request_key = ?",
      params![namespace, key],
    )?;
    Ok(removed > 0)
  }

  fn entry_requests(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT request FROM entries WHERE namespace = ? ORDER BY rowid")?;
    let requests = stmt
      .query_map(params![namespace], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(requests)
  }
}

fn insert_namespace(conn: &Connection, name: &str) -> Result<(), StorageError> {
  conn.execute(
    "INSERT OR IGNORE INTO namespaces (name) VALUES (?)",
    params![name],
  )?;
  Ok(())
}

fn insert_entry(conn: &Connection, namespace: &str, entry: &EntryWrite<'_>) -> Result<(), StorageError> {
  let headers = serde_json::to_string(&entry.response.headers)?;
  conn.execute(
    "INSERT OR REPLACE INTO entries (namespace, request_key, request, status, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      namespace,
      entry.key,
      entry.request,
      entry.response.status,
      headers,
      entry.response.body
    ],
  )?;
  Ok(())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|_| StorageError::Timestamp(s.to_string()))
}

#[cfg(test)]
impl SqliteStorage {
  /// Make every entry insert whose request identity contains `fragment` fail.
  pub(crate) fn reject_writes_matching(&self, fragment: &str) {
    let sql = format!(
      "CREATE TRIGGER reject_writes BEFORE INSERT ON entries
       WHEN NEW.request LIKE '%{}%'
       BEGIN SELECT RAISE(ABORT, 'write rejected'); END;",
      fragment
    );
    self.conn().unwrap().execute_batch(&sql).unwrap();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn page(body: &str) -> Response {
    Response::new(200, body).with_header("content-type", "text/html")
  }

  #[test]
  fn test_namespaces_listed_in_creation_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.create_namespace("static-v1").unwrap();
    storage.create_namespace("runtime-v1").unwrap();
    storage.create_namespace("static-v1").unwrap();

    assert_eq!(
      storage.namespace_names().unwrap(),
      vec!["static-v1".to_string(), "runtime-v1".to_string()]
    );
  }

  #[test]
  fn test_put_then_get_keeps_status_headers_and_body() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put_entry("static-v1", "k1", "GET https://a/", &page("<html>"))
      .unwrap();

    let cached = storage.get_entry("static-v1", "k1").unwrap().unwrap();
    assert_eq!(cached.response, page("<html>"));
    assert!(cached.cached_at <= Utc::now());
  }

  #[test]
  fn test_put_creates_missing_namespace() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put_entry("runtime-v1", "k1", "GET https://a/x.js", &page("x"))
      .unwrap();
    assert_eq!(storage.namespace_names().unwrap(), vec!["runtime-v1"]);
  }

  #[test]
  fn test_put_replaces_existing_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_entry("ns", "k1", "GET https://a/", &page("old")).unwrap();
    storage.put_entry("ns", "k1", "GET https://a/", &page("new")).unwrap();

    let cached = storage.get_entry("ns", "k1").unwrap().unwrap();
    assert_eq!(cached.response.body, b"new");
    assert_eq!(storage.entry_requests("ns").unwrap().len(), 1);
  }

  #[test]
  fn test_entries_are_scoped_to_namespace() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_entry("a", "k1", "GET https://a/", &page("a")).unwrap();

    assert!(storage.get_entry("b", "k1").unwrap().is_none());
    assert!(storage.get_entry("a", "missing").unwrap().is_none());
  }

  #[test]
  fn test_delete_namespace_drops_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_entry("old", "k1", "GET https://a/", &page("a")).unwrap();

    assert!(storage.delete_namespace("old").unwrap());
    assert!(!storage.delete_namespace("old").unwrap());
    assert!(storage.namespace_names().unwrap().is_empty());
    assert!(storage.get_entry("old", "k1").unwrap().is_none());
  }

  #[test]
  fn test_delete_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_entry("ns", "k1", "GET https://a/", &page("a")).unwrap();

    assert!(storage.delete_entry("ns", "k1").unwrap());
    assert!(!storage.delete_entry("ns", "k1").unwrap());
    assert!(storage.entry_requests("ns").unwrap().is_empty());
  }

  #[test]
  fn test_put_entries_writes_namespace_and_every_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let (a, b) = (page("a"), page("b"));
    storage
      .put_entries(
        "static-v1",
        &[
          EntryWrite { key: "k1", request: "GET https://a/", response: &a },
          EntryWrite { key: "k2", request: "GET https://a/b", response: &b },
        ],
      )
      .unwrap();

    assert_eq!(storage.namespace_names().unwrap(), vec!["static-v1"]);
    assert_eq!(
      storage.entry_requests("static-v1").unwrap(),
      vec!["GET https://a/", "GET https://a/b"]
    );
  }

  #[test]
  fn test_put_entries_failure_rolls_back_whole_batch() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.reject_writes_matching("third");
    let body = page("x");
    let entries = [
      EntryWrite { key: "k1", request: "GET https://a/first", response: &body },
      EntryWrite { key: "k2", request: "GET https://a/second", response: &body },
      EntryWrite { key: "k3", request: "GET https://a/third", response: &body },
      EntryWrite { key: "k4", request: "GET https://a/fourth", response: &body },
    ];

    let err = storage.put_entries("static-v2", &entries).unwrap_err();

    assert!(matches!(err, StorageError::Database(_)));
    assert!(storage.namespace_names().unwrap().is_empty());
    assert!(storage.get_entry("static-v2", "k1").unwrap().is_none());
    assert!(storage.get_entry("static-v2", "k2").unwrap().is_none());
  }

  #[test]
  fn test_file_backed_storage_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      storage
        .put_entry("static-v1", "k1", "GET https://a/", &page("kept"))
        .unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(storage.namespace_names().unwrap(), vec!["static-v1"]);
    let cached = storage.get_entry("static-v1", "k1").unwrap().unwrap();
    assert_eq!(cached.response.body, b"kept");
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
