//! Typed publish/subscribe channels with explicit unsubscribe handles.
//!
//! The browser client registers ambient event listeners (`online`,
//! `offline`, the custom purchase-submission event). Here each of those is
//! an explicit `EventBus<T>` so subscribers are visible and removable, and
//! tests can observe transitions without a live platform signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct BusInner<T> {
  next_id: AtomicU64,
  subscribers: Mutex<Vec<(u64, Callback<T>)>>,
}

/// A publish/subscribe channel for events of type `T`.
///
/// Multiple independent subscribers may coexist; they all observe every
/// published event with no ordering guarantee between them.
pub struct EventBus<T> {
  inner: Arc<BusInner<T>>,
}

impl<T: 'static> EventBus<T> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(BusInner {
        next_id: AtomicU64::new(0),
        subscribers: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Register a callback for published events.
  ///
  /// The callback stays registered until the returned handle is dropped or
  /// explicitly unsubscribed.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((id, Arc::new(callback)));

    let inner = Arc::clone(&self.inner);
    Subscription {
      cancel: Some(Box::new(move || {
        inner
          .subscribers
          .lock()
          .unwrap_or_else(PoisonError::into_inner)
          .retain(|(sub_id, _)| *sub_id != id);
      })),
    }
  }

  /// Deliver `event` to every current subscriber.
  pub fn publish(&self, event: &T) {
    // Snapshot so a callback can subscribe/unsubscribe without deadlocking
    let callbacks: Vec<Callback<T>> = self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, cb)| Arc::clone(cb))
      .collect();

    for callback in callbacks {
      callback(event);
    }
  }

  /// Number of currently registered subscribers.
  pub fn subscriber_count(&self) -> usize {
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }
}

impl<T: 'static> Default for EventBus<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for EventBus<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

/// Handle for a registered callback. Unsubscribes on drop.
pub struct Subscription {
  cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
  /// Remove the callback from its bus.
  pub fn unsubscribe(mut self) {
    if let Some(cancel) = self.cancel.take() {
      cancel();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(cancel) = self.cancel.take() {
      cancel();
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.cancel.is_some())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn test_publish_reaches_all_subscribers() {
    let bus: EventBus<u32> = EventBus::new();
    let seen = Arc::new(AtomicUsize::new(0));

    let seen_a = seen.clone();
    let _sub_a = bus.subscribe(move |v| {
      seen_a.fetch_add(*v as usize, Ordering::SeqCst);
    });
    let seen_b = seen.clone();
    let _sub_b = bus.subscribe(move |v| {
      seen_b.fetch_add(*v as usize, Ordering::SeqCst);
    });

    bus.publish(&5);
    assert_eq!(seen.load(Ordering::SeqCst), 10);
  }

  #[test]
  fn test_unsubscribe_removes_callback() {
    let bus: EventBus<()> = EventBus::new();
    let seen = Arc::new(AtomicUsize::new(0));

    let seen_clone = seen.clone();
    let sub = bus.subscribe(move |_| {
      seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(&());
    sub.unsubscribe();
    bus.publish(&());

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 0);
  }

  #[test]
  fn test_drop_unsubscribes() {
    let bus: EventBus<()> = EventBus::new();
    {
      let _sub = bus.subscribe(|_| {});
      assert_eq!(bus.subscriber_count(), 1);
    }
    assert_eq!(bus.subscriber_count(), 0);
  }
}
