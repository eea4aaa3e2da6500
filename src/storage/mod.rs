//! Persistent key-value substrate shared by the offline stores.
//!
//! The browser client keeps everything in a single page-global string
//! store. Here that substrate is an injected trait so the image cache and
//! the pending-purchase log can run against SQLite in production and an
//! in-memory map in tests. Keys are namespaced by prefix and must be
//! enumerable with a prefix scan.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::RwLock;

mod sqlite;

pub use sqlite::SqliteStore;

/// Trait for the shared persisted key-value store.
///
/// Individual `set`/`delete` calls are atomic against the substrate, but
/// there is no read-modify-write atomicity across two separate calls.
pub trait KeyValueStore: Send + Sync {
  /// Get the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, overwriting any previous value.
  ///
  /// May fail when the backing store is out of space; callers decide
  /// whether that is fatal.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete the value stored under `key`. Succeeds if the key is absent.
  fn delete(&self, key: &str) -> Result<()>;

  /// All entries whose key starts with `prefix`, as (key, value) pairs.
  fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// In-memory store for tests and hosts that bring their own persistence.
///
/// An optional capacity (total value bytes) lets tests simulate quota
/// exhaustion in the backing store.
#[derive(Default)]
pub struct MemoryStore {
  data: RwLock<HashMap<String, String>>,
  capacity: Option<usize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Limit the total number of value bytes the store will accept.
  pub fn with_capacity_limit(capacity: usize) -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      capacity: Some(capacity),
    }
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let data = self
      .data
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(data.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut data = self
      .data
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(capacity) = self.capacity {
      let used: usize = data
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(_, v)| v.len())
        .sum();
      if used + value.len() > capacity {
        return Err(eyre!(
          "Store quota exceeded: {} + {} > {}",
          used,
          value.len(),
          capacity
        ));
      }
    }

    data.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let mut data = self
      .data
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    data.remove(key);
    Ok(())
  }

  fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
    let data = self
      .data
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut entries: Vec<(String, String)> = data
      .iter()
      .filter(|(k, _)| k.starts_with(prefix))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
  }
}
