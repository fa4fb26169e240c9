//! Versioned response caching with offline support.
//!
//! This module provides:
//! - Named, persistent request → response namespaces (SQLite backed)
//! - `static`/`runtime` namespaces keyed by the deployment version
//! - Cache-first, network-first and shell-first resolution strategies

mod key;
mod namespace;
mod registry;
mod resolved;
mod storage;
mod strategy;

pub use namespace::Namespaces;
pub use registry::Caches;
pub use resolved::{Resolved, ResponseSource};
pub use storage::{CacheStorage, SqliteStorage};
pub use strategy::StrategyEngine;
