//! SQLite implementation of both storage traits.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::{CacheStorage, CachedResponse, KeyValueStore};
use crate::error::{Error, Result};
use crate::http::Response;

/// SQLite-based storage holding the key-value table and cache partitions.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "opened storage");

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(Connection::open_in_memory()?),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("cmms-offline").join("offline.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock()?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
  }
}

const SCHEMA: &str = r#"
-- Generic key-value storage (holds the serialized upload queue)
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named cache partitions, rowid gives creation order
CREATE TABLE IF NOT EXISTS cache_partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- URL-keyed response snapshots
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, url)
);
"#;

impl KeyValueStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn.lock()?;
    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn.lock()?;
    conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }
}

fn insert_entry(conn: &Connection, partition: &str, key: &str, response: &Response) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
    params![partition],
  )?;
  conn.execute(
    "INSERT OR REPLACE INTO cache_entries (partition, url, status, content_type, body, cached_at)
     VALUES (?, ?, ?, ?, ?, datetime('now'))",
    params![
      partition,
      key,
      response.status,
      response.content_type,
      response.body
    ],
  )?;
  Ok(())
}

type EntryRow = (u16, Option<String>, Vec<u8>, String);

fn row_to_cached((status, content_type, body, cached_at): EntryRow) -> Result<CachedResponse> {
  Ok(CachedResponse {
    response: Response::new(status, content_type, body),
    cached_at: parse_datetime(&cached_at)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, partition: &str) -> Result<()> {
    let conn = self.conn.lock()?;
    conn.execute(
      "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
      params![partition],
    )?;
    Ok(())
  }

  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()> {
    let conn = self.conn.lock()?;
    insert_entry(&conn, partition, key, response)
  }

  fn put_all(&self, partition: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut conn = self.conn.lock()?;
    let tx = conn.transaction()?;
    for (key, response) in entries {
      insert_entry(&tx, partition, key, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn lookup(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.conn.lock()?;
    let row: Option<EntryRow> = conn
      .query_row(
        "SELECT status, content_type, body, cached_at FROM cache_entries
         WHERE partition = ? AND url = ?",
        params![partition, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    row.map(row_to_cached).transpose()
  }

  fn lookup_any(&self, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.conn.lock()?;
    let row: Option<EntryRow> = conn
      .query_row(
        "SELECT ce.status, ce.content_type, ce.body, ce.cached_at FROM cache_entries ce
         INNER JOIN cache_partitions cp ON cp.name = ce.partition
         WHERE ce.url = ?
         ORDER BY cp.rowid
         LIMIT 1",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    row.map(row_to_cached).transpose()
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.conn.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM cache_partitions ORDER BY rowid")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut conn = self.conn.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM cache_entries WHERE partition = ?",
      params![partition],
    )?;
    let removed = tx.execute(
      "DELETE FROM cache_partitions WHERE name = ?",
      params![partition],
    )?;
    tx.commit()?;
    Ok(removed > 0)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}
