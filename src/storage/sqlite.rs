//! SQLite-backed key-value store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Durable key-value store on a single SQLite table.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// Open a transient in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("storesync").join("store.db"))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM kv WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store value: {}", e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete value: {}", e))?;

    Ok(())
  }

  fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // substr comparison instead of LIKE: URLs in keys may contain '%' or '_'
    let mut stmt = conn
      .prepare("SELECT key, value FROM kv WHERE substr(key, 1, ?) = ? ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare scan: {}", e))?;

    let entries: Vec<(String, String)> = stmt
      .query_map(params![prefix.chars().count() as i64, prefix], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .map_err(|e| eyre!("Failed to scan prefix: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(entries)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_roundtrip() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap(), Some("v".to_string()));

    store.set("k", "v2").unwrap();
    assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));

    store.delete("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
  }

  #[test]
  fn test_sqlite_scan_prefix() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("img_cache_v1_http://x/a.png", "a").unwrap();
    store.set("img_cache_v1_http://x/b.png", "b").unwrap();
    store.set("pending_purchase_1", "p").unwrap();

    let entries = store.scan_prefix("img_cache_").unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|(k, _)| k.starts_with("img_cache_")));
  }

  #[test]
  fn test_sqlite_scan_prefix_with_like_metacharacters() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("pfx_100%_a", "a").unwrap();
    store.set("zzz_100%_b", "b").unwrap();

    let entries = store.scan_prefix("pfx_100%").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, "a");
  }
}
