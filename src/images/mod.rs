//! Size-bounded persistent cache for remotely fetched images.
//!
//! Previously viewed covers and screenshots stay available offline. The
//! cache is strictly best-effort: it must never cause a user-visible
//! failure, so every fault (quota, malformed record, fetch error) is
//! logged and absorbed, degrading to miss behavior. Storage is bounded
//! without a live size index; totals are recomputed by prefix scan, which
//! trades a small CPU cost for having no index to get out of sync.

mod client;

pub use client::{FetchedImage, ImageClient};

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::storage::KeyValueStore;

const CACHE_PREFIX: &str = "img_cache_";
const CACHE_VERSION: &str = "v1";

/// Persisted record wire format: `{ data, timestamp, size }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedImage {
  /// Image payload as a base64 data URL.
  data: String,
  /// Storage time, Unix milliseconds.
  timestamp: i64,
  /// Payload size in bytes.
  size: u64,
}

/// Bounded persistent image cache over an injected key-value store.
pub struct ImageCache<S: KeyValueStore> {
  store: Arc<S>,
  /// Total cache budget in bytes.
  budget: u64,
  /// Per-image ceiling; larger fetches are not cached.
  max_image_bytes: u64,
  /// Entries older than this are never returned.
  retention_ms: i64,
  /// Fraction of entries removed per prune pass, oldest first.
  prune_fraction: f64,
}

impl<S: KeyValueStore> ImageCache<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self::with_config(store, &CacheConfig::default())
  }

  pub fn with_config(store: Arc<S>, config: &CacheConfig) -> Self {
    Self {
      store,
      budget: config.max_total_bytes,
      max_image_bytes: config.max_image_bytes,
      retention_ms: config.retention_days * 24 * 60 * 60 * 1000,
      prune_fraction: config.prune_fraction,
    }
  }

  /// Override the total cache budget.
  pub fn with_budget(mut self, budget: u64) -> Self {
    self.budget = budget;
    self
  }

  fn cache_key(&self, url: &str) -> String {
    format!("{}{}_{}", CACHE_PREFIX, CACHE_VERSION, url)
  }

  fn key_prefix() -> String {
    format!("{}{}", CACHE_PREFIX, CACHE_VERSION)
  }

  /// Store an image payload under its source URL.
  ///
  /// Evicts oldest entries in 30% batches until the new entry fits within
  /// the budget. Persistence failures are logged, never surfaced; caching
  /// must not block the caller.
  pub fn store(&self, url: &str, payload: &str) {
    if let Err(e) = self.store_inner(url, payload) {
      warn!("Failed to cache image {}: {}", url, e);
    }
  }

  fn store_inner(&self, url: &str, payload: &str) -> Result<()> {
    let size = payload.len() as u64;
    if size > self.budget {
      return Err(eyre!(
        "Payload of {} bytes exceeds the whole cache budget",
        size
      ));
    }

    let mut total = self.total_size();
    while total + size > self.budget {
      let removed = self.prune_inner()?;
      if removed == 0 {
        break;
      }
      total = self.total_size();
    }

    let record = CachedImage {
      data: payload.to_string(),
      timestamp: Utc::now().timestamp_millis(),
      size,
    };
    let encoded =
      serde_json::to_string(&record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

    self.store.set(&self.cache_key(url), &encoded)
  }

  /// Get the cached payload for a URL, if present and not expired.
  ///
  /// An expired record is deleted on read; a malformed record is treated
  /// as absent.
  pub fn retrieve(&self, url: &str) -> Option<String> {
    let key = self.cache_key(url);
    let raw = match self.store.get(&key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!("Failed to read cached image {}: {}", url, e);
        return None;
      }
    };

    let record: CachedImage = match serde_json::from_str(&raw) {
      Ok(record) => record,
      Err(_) => return None,
    };

    let age = Utc::now().timestamp_millis() - record.timestamp;
    if age > self.retention_ms {
      if let Err(e) = self.store.delete(&key) {
        warn!("Failed to delete expired image {}: {}", url, e);
      }
      return None;
    }

    Some(record.data)
  }

  /// Total bytes across live entries, recomputed by prefix scan.
  ///
  /// Malformed records are skipped without aborting the scan.
  pub fn total_size(&self) -> u64 {
    let entries = match self.store.scan_prefix(&Self::key_prefix()) {
      Ok(entries) => entries,
      Err(e) => {
        warn!("Failed to scan image cache: {}", e);
        return 0;
      }
    };

    entries
      .iter()
      .filter_map(|(_, raw)| serde_json::from_str::<CachedImage>(raw).ok())
      .map(|record| record.size)
      .sum()
  }

  /// Evict the oldest entries by timestamp.
  ///
  /// Removes the oldest 30% by count (ceiling rounding, so a non-empty
  /// cache always loses at least one entry). Returns the number evicted.
  pub fn prune(&self) -> usize {
    match self.prune_inner() {
      Ok(removed) => removed,
      Err(e) => {
        warn!("Failed to prune image cache: {}", e);
        0
      }
    }
  }

  fn prune_inner(&self) -> Result<usize> {
    let entries = self.store.scan_prefix(&Self::key_prefix())?;

    let mut items: Vec<(String, i64)> = entries
      .into_iter()
      .filter_map(|(key, raw)| {
        serde_json::from_str::<CachedImage>(&raw)
          .ok()
          .map(|record| (key, record.timestamp))
      })
      .collect();

    if items.is_empty() {
      return Ok(0);
    }

    items.sort_by_key(|(_, timestamp)| *timestamp);

    let to_remove = ((items.len() as f64) * self.prune_fraction).ceil() as usize;
    for (key, _) in items.iter().take(to_remove) {
      self.store.delete(key)?;
    }

    debug!("Pruned {} cached images", to_remove);
    Ok(to_remove)
  }

  /// Remove every entry under the cache's key namespace.
  pub fn clear(&self) {
    let entries = match self.store.scan_prefix(&Self::key_prefix()) {
      Ok(entries) => entries,
      Err(e) => {
        warn!("Failed to scan image cache: {}", e);
        return;
      }
    };

    for (key, _) in entries {
      if let Err(e) = self.store.delete(&key) {
        warn!("Failed to delete cached image {}: {}", key, e);
      }
    }
  }

  /// Prefetch an image into the cache.
  ///
  /// No-op when already cached. Responses over the per-image ceiling are
  /// skipped so one large image cannot starve the budget. Fetch failures
  /// are swallowed; this is an optimization, not a required path.
  pub async fn fetch_and_cache<F, Fut>(&self, url: &str, fetcher: F)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<FetchedImage>>,
  {
    if self.retrieve(url).is_some() {
      return;
    }

    match fetcher().await {
      Ok(image) => {
        if image.bytes.len() as u64 > self.max_image_bytes {
          debug!(
            "Skipping oversized image {} ({} bytes)",
            url,
            image.bytes.len()
          );
          return;
        }
        self.store(url, &image.to_data_url());
      }
      Err(e) => {
        warn!("Failed to fetch and cache image {}: {}", url, e);
      }
    }
  }
}

impl<S: KeyValueStore> Clone for ImageCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      budget: self.budget,
      max_image_bytes: self.max_image_bytes,
      retention_ms: self.retention_ms,
      prune_fraction: self.prune_fraction,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStore;

  fn cache_with_budget(budget: u64) -> ImageCache<MemoryStore> {
    ImageCache::new(Arc::new(MemoryStore::new())).with_budget(budget)
  }

  fn raw_record(data: &str, timestamp: i64) -> String {
    serde_json::to_string(&CachedImage {
      data: data.to_string(),
      timestamp,
      size: data.len() as u64,
    })
    .unwrap()
  }

  #[test]
  fn test_store_and_retrieve() {
    let cache = cache_with_budget(1024);
    cache.store("http://x/a.png", "data:image/png;base64,AAAA");
    assert_eq!(
      cache.retrieve("http://x/a.png"),
      Some("data:image/png;base64,AAAA".to_string())
    );
    assert_eq!(cache.retrieve("http://x/missing.png"), None);
  }

  #[test]
  fn test_total_size_never_exceeds_budget() {
    let cache = cache_with_budget(10);
    for i in 0..8 {
      cache.store(&format!("http://x/{}.png", i), "aaaa");
      assert!(cache.total_size() <= 10, "budget exceeded after store {}", i);
    }
  }

  #[test]
  fn test_store_evicts_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let cache = ImageCache::new(Arc::clone(&store)).with_budget(10);

    // Two 4-byte entries with known ages, oldest is a
    let now = Utc::now().timestamp_millis();
    store
      .set(
        &cache.cache_key("http://x/a.png"),
        &raw_record("aaaa", now - 10_000),
      )
      .unwrap();
    store
      .set(
        &cache.cache_key("http://x/b.png"),
        &raw_record("bbbb", now - 5_000),
      )
      .unwrap();

    // Third 4-byte entry pushes the projected total to 12 > 10
    cache.store("http://x/c.png", "cccc");

    assert!(cache.total_size() <= 10);
    assert_eq!(cache.retrieve("http://x/a.png"), None);
    assert!(cache.retrieve("http://x/b.png").is_some());
    assert!(cache.retrieve("http://x/c.png").is_some());
  }

  #[test]
  fn test_prune_removes_at_least_one_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let cache = ImageCache::new(Arc::clone(&store));

    let now = Utc::now().timestamp_millis();
    for (i, age_ms) in [(0, 5_000i64), (1, 9_000), (2, 1_000)] {
      store
        .set(
          &cache.cache_key(&format!("http://x/{}.png", i)),
          &raw_record("data", now - age_ms),
        )
        .unwrap();
    }

    // ceil(3 * 0.3) = 1, and the oldest (entry 1) goes first
    let removed = cache.prune();
    assert_eq!(removed, 1);
    assert_eq!(cache.retrieve("http://x/1.png"), None);
    assert!(cache.retrieve("http://x/0.png").is_some());
    assert!(cache.retrieve("http://x/2.png").is_some());
  }

  #[test]
  fn test_prune_on_empty_cache() {
    let cache = cache_with_budget(1024);
    assert_eq!(cache.prune(), 0);
  }

  #[test]
  fn test_retrieve_expires_old_entries() {
    let store = Arc::new(MemoryStore::new());
    let cache = ImageCache::new(Arc::clone(&store));

    let eight_days_ago = Utc::now().timestamp_millis() - 8 * 24 * 60 * 60 * 1000;
    let key = cache.cache_key("http://x/old.png");
    store.set(&key, &raw_record("stale", eight_days_ago)).unwrap();

    assert_eq!(cache.retrieve("http://x/old.png"), None);
    // Deleted on read; the re-check is idempotent
    assert_eq!(store.get(&key).unwrap(), None);
    assert_eq!(cache.retrieve("http://x/old.png"), None);
  }

  #[test]
  fn test_malformed_record_is_treated_as_absent() {
    let store = Arc::new(MemoryStore::new());
    let cache = ImageCache::new(Arc::clone(&store));

    store
      .set(&cache.cache_key("http://x/bad.png"), "not json")
      .unwrap();
    store
      .set(
        &cache.cache_key("http://x/ok.png"),
        &raw_record("fine", Utc::now().timestamp_millis()),
      )
      .unwrap();

    assert_eq!(cache.retrieve("http://x/bad.png"), None);
    // The scan skips the malformed record instead of aborting
    assert_eq!(cache.total_size(), 4);
  }

  #[test]
  fn test_quota_failure_is_swallowed() {
    let store = Arc::new(MemoryStore::with_capacity_limit(8));
    let cache = ImageCache::new(store).with_budget(1024);

    // The record JSON is larger than the substrate's capacity; the write
    // fails inside the store and must not panic or surface
    cache.store("http://x/a.png", "aaaa");
    assert_eq!(cache.retrieve("http://x/a.png"), None);
  }

  #[test]
  fn test_clear_removes_only_cache_namespace() {
    let store = Arc::new(MemoryStore::new());
    let cache = ImageCache::new(Arc::clone(&store));

    cache.store("http://x/a.png", "aaaa");
    store.set("pending_purchase_1", "{}").unwrap();

    cache.clear();
    assert_eq!(cache.retrieve("http://x/a.png"), None);
    assert_eq!(cache.total_size(), 0);
    assert!(store.get("pending_purchase_1").unwrap().is_some());
  }

  #[tokio::test]
  async fn test_fetch_and_cache_skips_when_cached() {
    let cache = cache_with_budget(1024);
    cache.store("http://x/a.png", "cached");

    cache
      .fetch_and_cache("http://x/a.png", || async {
        panic!("fetcher must not run for a cached url")
      })
      .await;
    assert_eq!(cache.retrieve("http://x/a.png"), Some("cached".to_string()));
  }

  #[tokio::test]
  async fn test_fetch_and_cache_skips_oversized() {
    let cache = ImageCache::new(Arc::new(MemoryStore::new()));

    cache
      .fetch_and_cache("http://x/huge.png", || async {
        Ok(FetchedImage {
          bytes: vec![0u8; 501 * 1024],
          content_type: "image/png".to_string(),
        })
      })
      .await;
    assert_eq!(cache.retrieve("http://x/huge.png"), None);
  }

  #[tokio::test]
  async fn test_fetch_and_cache_swallows_fetch_failure() {
    let cache = cache_with_budget(1024);

    cache
      .fetch_and_cache("http://x/gone.png", || async {
        Err(eyre!("connection refused"))
      })
      .await;
    assert_eq!(cache.retrieve("http://x/gone.png"), None);
  }

  #[tokio::test]
  async fn test_fetch_and_cache_stores_data_url() {
    let cache = cache_with_budget(1024);

    cache
      .fetch_and_cache("http://x/a.png", || async {
        Ok(FetchedImage {
          bytes: vec![1, 2, 3],
          content_type: "image/png".to_string(),
        })
      })
      .await;

    let data = cache.retrieve("http://x/a.png").unwrap();
    assert!(data.starts_with("data:image/png;base64,"));
  }
}
