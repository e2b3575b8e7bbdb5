//! Named response stores and their SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::response::CachedHttpResponse;

/// The three store families a worker generation owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
  Static,
  Api,
  Media,
}

impl StoreKind {
  /// Lookup order of the offline fallback chain.
  pub const ALL: [StoreKind; 3] = [StoreKind::Static, StoreKind::Api, StoreKind::Media];
}

/// Store names of one generation, e.g. `service-crym-api-v3.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNames {
  static_store: String,
  api: String,
  media: String,
}

impl StoreNames {
  pub fn new(prefix: &str, generation: &str) -> Self {
    Self {
      static_store: format!("{}-{}", prefix, generation),
      api: format!("{}-api-{}", prefix, generation),
      media: format!("{}-media-{}", prefix, generation),
    }
  }

  pub fn name(&self, kind: StoreKind) -> &str {
    match kind {
      StoreKind::Static => &self.static_store,
      StoreKind::Api => &self.api,
      StoreKind::Media => &self.media,
    }
  }

  pub fn all(&self) -> [&str; 3] {
    StoreKind::ALL.map(|kind| self.name(kind))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.all().contains(&name)
  }
}

/// Persistent keyed response stores.
///
/// Each call is independently atomic. Writing to a store that does not exist
/// yet creates it.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the store if missing.
  fn open_store(&self, store: &str) -> Result<()>;

  fn store_names(&self) -> Result<Vec<String>>;

  /// Delete a store and everything in it. Returns false if it did not exist.
  fn delete_store(&self, store: &str) -> Result<bool>;

  fn get(&self, store: &str, key: &str) -> Result<Option<CachedHttpResponse>>;

  fn put(&self, store: &str, key: &str, response: &CachedHttpResponse) -> Result<()>;

  /// Write every entry or none.
  fn put_all(&self, store: &str, entries: &[(String, CachedHttpResponse)]) -> Result<()>;

  fn entry_count(&self, store: &str) -> Result<usize>;
}

impl<S: CacheStorage> CacheStorage for Arc<S> {
  fn open_store(&self, store: &str) -> Result<()> {
    (**self).open_store(store)
  }

  fn store_names(&self) -> Result<Vec<String>> {
    (**self).store_names()
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    (**self).delete_store(store)
  }

  fn get(&self, store: &str, key: &str) -> Result<Option<CachedHttpResponse>> {
    (**self).get(store, key)
  }

  fn put(&self, store: &str, key: &str, response: &CachedHttpResponse) -> Result<()> {
    (**self).put(store, key, response)
  }

  fn put_all(&self, store: &str, entries: &[(String, CachedHttpResponse)]) -> Result<()> {
    (**self).put_all(store, entries)
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    (**self).entry_count(store)
  }
}

/// SQLite-backed stores. One database holds every store.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    Self::with_connection(conn)
  }

  /// Stores that live as long as the process.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("crymnet").join("worker-cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cached_responses (
    store TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    PRIMARY KEY (store, request_key)
);
"#;

fn insert_response(
  conn: &Connection,
  store: &str,
  key: &str,
  response: &CachedHttpResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;
  conn
    .execute(
      "INSERT OR REPLACE INTO cached_responses (store, request_key, status, headers, body)
       VALUES (?, ?, ?, ?, ?)",
      params![store, key, response.status, headers, response.body],
    )
    .map_err(|e| eyre!("Failed to store response: {}", e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_store(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;
    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read store name: {}", e))?;
    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cached_responses WHERE store = ?",
      params![store],
    )
    .map_err(|e| eyre!("Failed to delete responses of {}: {}", store, e))?;
    let removed = tx
      .execute("DELETE FROM cache_stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(removed > 0)
  }

  fn get(&self, store: &str, key: &str) -> Result<Option<CachedHttpResponse>> {
    let conn = self.lock()?;
    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM cached_responses
         WHERE store = ? AND request_key = ?",
        params![store, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cached response: {}", e))?;

    match row {
      Some((status, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(CachedHttpResponse {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, key: &str, response: &CachedHttpResponse) -> Result<()> {
    let conn = self.lock()?;
    insert_response(&conn, store, key, response)
  }

  fn put_all(&self, store: &str, entries: &[(String, CachedHttpResponse)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      insert_response(&tx, store, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cached_responses WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;
    Ok(count as usize)
  }
}
