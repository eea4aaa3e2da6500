//! Persistent log of purchases awaiting delivery.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::storage::KeyValueStore;

use super::types::{PendingPurchase, PurchaseRequest};

const PENDING_PREFIX: &str = "pending_purchase_";

/// Process-wide sequence for id uniqueness within a millisecond.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Append/remove log of pending purchases over the key-value substrate.
///
/// One key per entry under a dedicated namespace; entries are never
/// mutated in place. A delivery attempt either removes the entry or
/// leaves it untouched. No cap is enforced: deferred purchases are rare
/// and high-value, unlike cached images.
pub struct PendingStore<S: KeyValueStore> {
  store: Arc<S>,
}

impl<S: KeyValueStore> PendingStore<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  fn entry_key(id: &str) -> String {
    format!("{}{}", PENDING_PREFIX, id)
  }

  /// Persist a purchase for later delivery, assigning its id and
  /// creation timestamp.
  pub fn enqueue(&self, request: PurchaseRequest) -> Result<PendingPurchase> {
    let created_at = Utc::now().timestamp_millis();
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    // Zero-padded so ids created in the same millisecond sort in
    // creation order
    let id = format!("purchase_{}_{:06}", created_at, seq);

    let pending = PendingPurchase {
      id,
      game_id: request.game_id,
      game_name: request.game_name,
      price: request.price,
      user_id: request.user_id,
      payment_method: request.payment_method,
      created_at,
    };

    let encoded = serde_json::to_string(&pending)
      .map_err(|e| eyre!("Failed to serialize pending purchase: {}", e))?;
    self.store.set(&Self::entry_key(&pending.id), &encoded)?;

    Ok(pending)
  }

  /// All queued entries in insertion order.
  pub fn list_pending(&self) -> Result<Vec<PendingPurchase>> {
    let entries = self.store.scan_prefix(PENDING_PREFIX)?;

    let mut pending: Vec<PendingPurchase> = entries
      .into_iter()
      .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
          warn!("Skipping malformed pending purchase {}: {}", key, e);
          None
        }
      })
      .collect();

    pending.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    Ok(pending)
  }

  /// Delete the entry with the given id. No-op if absent.
  pub fn remove(&self, id: &str) -> Result<()> {
    self.store.delete(&Self::entry_key(id))
  }

  /// Number of queued entries.
  pub fn count(&self) -> Result<usize> {
    Ok(self.list_pending()?.len())
  }

  pub fn has_pending(&self) -> Result<bool> {
    Ok(self.count()? > 0)
  }

  /// Drop every queued entry.
  pub fn clear(&self) -> Result<()> {
    for (key, _) in self.store.scan_prefix(PENDING_PREFIX)? {
      self.store.delete(&key)?;
    }
    Ok(())
  }
}

impl<S: KeyValueStore> Clone for PendingStore<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}
