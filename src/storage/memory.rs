//! In-memory storage backend.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{CacheStorage, CachedResponse, KeyValueStore};
use crate::error::Result;
use crate::http::Response;

#[derive(Default)]
struct Inner {
  kv: HashMap<String, String>,
  /// Partitions in creation order
  partitions: Vec<(String, HashMap<String, CachedResponse>)>,
}

impl Inner {
  fn partition_mut(&mut self, name: &str) -> &mut HashMap<String, CachedResponse> {
    let idx = match self.partitions.iter().position(|(n, _)| n == name) {
      Some(idx) => idx,
      None => {
        self.partitions.push((name.to_string(), HashMap::new()));
        self.partitions.len() - 1
      }
    };
    &mut self.partitions[idx].1
  }
}

/// Storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<Inner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.inner.lock()?.kv.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self
      .inner
      .lock()?
      .kv
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.inner.lock()?.kv.remove(key);
    Ok(())
  }
}

impl CacheStorage for MemoryStorage {
  fn open_partition(&self, partition: &str) -> Result<()> {
    self.inner.lock()?.partition_mut(partition);
    Ok(())
  }

  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()> {
    let entry = CachedResponse {
      response: response.clone(),
      cached_at: Utc::now(),
    };
    self
      .inner
      .lock()?
      .partition_mut(partition)
      .insert(key.to_string(), entry);
    Ok(())
  }

  fn put_all(&self, partition: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut inner = self.inner.lock()?;
    let target = inner.partition_mut(partition);
    let now = Utc::now();
    for (key, response) in entries {
      target.insert(
        key.clone(),
        CachedResponse {
          response: response.clone(),
          cached_at: now,
        },
      );
    }
    Ok(())
  }

  fn lookup(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>> {
    let inner = self.inner.lock()?;
    Ok(
      inner
        .partitions
        .iter()
        .find(|(name, _)| name == partition)
        .and_then(|(_, entries)| entries.get(key).cloned()),
    )
  }

  fn lookup_any(&self, key: &str) -> Result<Option<CachedResponse>> {
    let inner = self.inner.lock()?;
    Ok(
      inner
        .partitions
        .iter()
        .find_map(|(_, entries)| entries.get(key).cloned()),
    )
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let inner = self.inner.lock()?;
    Ok(inner.partitions.iter().map(|(name, _)| name.clone()).collect())
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut inner = self.inner.lock()?;
    let before = inner.partitions.len();
    inner.partitions.retain(|(name, _)| name != partition);
    Ok(inner.partitions.len() != before)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partitions_keep_creation_order() {
    let storage = MemoryStorage::new();
    storage.open_partition("b").unwrap();
    storage.put("a", "k", &Response::text(200, "")).unwrap();
    storage.open_partition("b").unwrap();

    assert_eq!(storage.partitions().unwrap(), vec!["b", "a"]);
  }

  #[test]
  fn test_kv() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.get("x").unwrap(), None);
    storage.set("x", "1").unwrap();
    assert_eq!(storage.get("x").unwrap().as_deref(), Some("1"));
    storage.remove("x").unwrap();
    assert_eq!(storage.get("x").unwrap(), None);
  }
}
