//! Network reachability signal with transition subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::events::{EventBus, Subscription};

struct MonitorInner {
  online: AtomicBool,
  became_online: EventBus<()>,
  became_offline: EventBus<()>,
}

/// Process-wide view of the platform's online/offline signal.
///
/// The monitor has no persisted form; the host constructs it from the live
/// reachability signal at startup and feeds transitions via `set_online`.
/// The purchase replay flow and any connectivity banner are independent
/// subscribers observing the same transitions.
pub struct ConnectivityMonitor {
  inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
  pub fn new(initially_online: bool) -> Self {
    Self {
      inner: Arc::new(MonitorInner {
        online: AtomicBool::new(initially_online),
        became_online: EventBus::new(),
        became_offline: EventBus::new(),
      }),
    }
  }

  /// Current reachability, synchronously.
  pub fn is_online(&self) -> bool {
    self.inner.online.load(Ordering::SeqCst)
  }

  /// Host binding for the platform signal.
  ///
  /// Fires the matching transition bus only on an actual change.
  pub fn set_online(&self, online: bool) {
    let was_online = self.inner.online.swap(online, Ordering::SeqCst);
    if was_online == online {
      return;
    }

    if online {
      info!("Connectivity restored");
      self.inner.became_online.publish(&());
    } else {
      info!("Connectivity lost");
      self.inner.became_offline.publish(&());
    }
  }

  /// Subscribe to offline → online transitions.
  pub fn on_online<F>(&self, callback: F) -> Subscription
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.inner.became_online.subscribe(move |_| callback())
  }

  /// Subscribe to online → offline transitions.
  pub fn on_offline<F>(&self, callback: F) -> Subscription
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.inner.became_offline.subscribe(move |_| callback())
  }
}

impl Clone for ConnectivityMonitor {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn test_transitions_fire_only_on_change() {
    let monitor = ConnectivityMonitor::new(true);
    let online_count = Arc::new(AtomicUsize::new(0));
    let offline_count = Arc::new(AtomicUsize::new(0));

    let oc = online_count.clone();
    let _on = monitor.on_online(move || {
      oc.fetch_add(1, Ordering::SeqCst);
    });
    let fc = offline_count.clone();
    let _off = monitor.on_offline(move || {
      fc.fetch_add(1, Ordering::SeqCst);
    });

    // Already online, no transition
    monitor.set_online(true);
    assert_eq!(online_count.load(Ordering::SeqCst), 0);

    monitor.set_online(false);
    assert!(!monitor.is_online());
    assert_eq!(offline_count.load(Ordering::SeqCst), 1);

    monitor.set_online(true);
    assert!(monitor.is_online());
    assert_eq!(online_count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_multiple_independent_subscribers() {
    let monitor = ConnectivityMonitor::new(false);
    let count = Arc::new(AtomicUsize::new(0));

    let c1 = count.clone();
    let _s1 = monitor.on_online(move || {
      c1.fetch_add(1, Ordering::SeqCst);
    });
    let c2 = count.clone();
    let s2 = monitor.on_online(move || {
      c2.fetch_add(1, Ordering::SeqCst);
    });

    monitor.set_online(true);
    assert_eq!(count.load(Ordering::SeqCst), 2);

    s2.unsubscribe();
    monitor.set_online(false);
    monitor.set_online(true);
    assert_eq!(count.load(Ordering::SeqCst), 3);
  }
}
