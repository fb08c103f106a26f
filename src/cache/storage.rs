//! Cache storage trait with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::traits::{CacheEntry, CachedResponse};
use crate::db::Database;
use crate::http::Response;

/// Trait for named cache store backends.
///
/// Stores are enumerated and searched in creation order.
pub trait CacheStorage: Send + Sync {
  /// Open the named store, creating it if absent.
  fn open(&self, name: &str) -> Result<()>;

  /// Write every entry into the named store, or none of them.
  fn put_all(&self, name: &str, entries: &[CacheEntry]) -> Result<()>;

  /// Look up a URL in one store.
  fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Look up a URL across every store; the oldest store holding it wins.
  fn match_any(&self, url: &str) -> Result<Option<CachedResponse>>;

  /// Names of all stores.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a store and its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// URLs held by a store.
  fn entries(&self, name: &str) -> Result<Vec<String>>;
}

struct MemoryStore {
  name: String,
  entries: BTreeMap<String, (Response, DateTime<Utc>)>,
}

/// Storage implementation that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<Vec<MemoryStore>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_stores<R>(&self, f: impl FnOnce(&mut Vec<MemoryStore>) -> R) -> Result<R> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(f(&mut stores))
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.with_stores(|stores| {
      if !stores.iter().any(|s| s.name == name) {
        stores.push(MemoryStore {
          name: name.to_string(),
          entries: BTreeMap::new(),
        });
      }
    })
  }

  fn put_all(&self, name: &str, entries: &[CacheEntry]) -> Result<()> {
    self.with_stores(|stores| {
      let index = match stores.iter().position(|s| s.name == name) {
        Some(index) => index,
        None => {
          stores.push(MemoryStore {
            name: name.to_string(),
            entries: BTreeMap::new(),
          });
          stores.len() - 1
        }
      };
      let now = Utc::now();
      for entry in entries {
        stores[index]
          .entries
          .insert(entry.url.clone(), (entry.response.clone(), now));
      }
    })
  }

  fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>> {
    self.with_stores(|stores| {
      stores
        .iter()
        .find(|s| s.name == name)
        .and_then(|s| lookup(s, url))
    })
  }

  fn match_any(&self, url: &str) -> Result<Option<CachedResponse>> {
    self.with_stores(|stores| stores.iter().find_map(|s| lookup(s, url)))
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.with_stores(|stores| stores.iter().map(|s| s.name.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    self.with_stores(|stores| {
      let before = stores.len();
      stores.retain(|s| s.name != name);
      stores.len() != before
    })
  }

  fn entries(&self, name: &str) -> Result<Vec<String>> {
    self.with_stores(|stores| {
      stores
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.entries.keys().cloned().collect())
        .unwrap_or_default()
    })
  }
}

fn lookup(store: &MemoryStore, url: &str) -> Option<CachedResponse> {
  store
    .entries
    .get(url)
    .map(|(response, cached_at)| CachedResponse {
      cache_name: store.name.clone(),
      url: url.to_string(),
      response: response.clone(),
      cached_at: *cached_at,
    })
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
    Ok(())
  }

  fn put_all(&self, name: &str, entries: &[CacheEntry]) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

    for entry in entries {
      let headers = serde_json::to_string(&entry.response.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO cache_entries (cache_name, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![
          name,
          entry.url,
          entry.response.status,
          headers,
          entry.response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", entry.url, e))?;
    }

    // Dropping an uncommitted transaction rolls it back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self.db.lock()?;
    let row = conn
      .query_row(
        "SELECT cache_name, status, headers, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND url = ?",
        params![name, url],
        read_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache {}: {}", name, e))?;

    row.map(|row| row.into_cached(url)).transpose()
  }

  fn match_any(&self, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self.db.lock()?;
    let row = conn
      .query_row(
        "SELECT e.cache_name, e.status, e.headers, e.body, e.cached_at FROM cache_entries e
         INNER JOIN cache_stores s ON s.name = e.cache_name
         WHERE e.url = ?
         ORDER BY s.id
         LIMIT 1",
        params![url],
        read_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query caches: {}", e))?;

    row.map(|row| row.into_cached(url)).transpose()
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM cache_stores WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn entries(&self, name: &str) -> Result<Vec<String>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare("SELECT url FROM cache_entries WHERE cache_name = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![name], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries of {}: {}", name, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry url: {}", e))?;

    Ok(urls)
  }
}

/// Raw columns of a cache_entries row.
struct EntryRow {
  cache_name: String,
  status: u16,
  headers: String,
  body: Vec<u8>,
  cached_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok(EntryRow {
    cache_name: row.get(0)?,
    status: row.get(1)?,
    headers: row.get(2)?,
    body: row.get(3)?,
    cached_at: row.get(4)?,
  })
}

impl EntryRow {
  fn into_cached(self, url: &str) -> Result<CachedResponse> {
    let headers: Vec<(String, String)> = serde_json::from_str(&self.headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

    Ok(CachedResponse {
      cache_name: self.cache_name,
      url: url.to_string(),
      response: Response {
        status: self.status,
        headers,
        body: self.body,
      },
      cached_at: parse_datetime(&self.cached_at)?,
    })
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
