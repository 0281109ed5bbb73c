//! Durable storage shared by the page and the worker.
//!
//! Two concerns live here:
//! - a string key-value store (the offline queue is one key in it)
//! - named cache partitions of URL-keyed response snapshots
//!
//! Both are traits so components can be handed an in-memory backend in tests
//! and the SQLite backend in the binary.

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::http::Response;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// A response snapshot read back from a cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Named partitions of URL → response snapshots.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open_partition(&self, partition: &str) -> Result<()>;

  /// Store (or replace) one entry, creating the partition on demand.
  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()>;

  /// Store several entries at once; either all are written or none.
  fn put_all(&self, partition: &str, entries: &[(String, Response)]) -> Result<()>;

  /// Look up an entry in one partition.
  fn lookup(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>>;

  /// Look up an entry in every partition, oldest partition first.
  fn lookup_any(&self, key: &str) -> Result<Option<CachedResponse>>;

  /// Names of all existing partitions, in creation order.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Delete a partition and its entries. Returns whether it existed.
  fn delete_partition(&self, partition: &str) -> Result<bool>;
}
