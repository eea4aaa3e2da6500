//! Purchase attempt orchestration and event-driven replay.
//!
//! Each attempt runs a small state machine: `Idle → Attempting →
//! {Delivered | Deferred}`. Offline submission, a server-side error
//! (status >= 500) and any unexpected transport failure all resolve as
//! `Deferred` — the purchase is accepted from the user's perspective and
//! queued. A client-side rejection is the one hard failure: retrying an
//! invalid request cannot succeed.
//!
//! Replay is driven purely by connectivity transitions, with no backoff
//! or attempt cap. A flapping connection therefore causes repeated replay
//! passes; the remote peer's idempotency handling makes that safe under
//! the at-least-once contract.

use color_eyre::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::events::{EventBus, Subscription};
use crate::storage::KeyValueStore;

use super::pending::PendingStore;
use super::types::{PendingPurchase, PurchaseRequest};

/// The remote purchase-processing peer.
///
/// An opaque network endpoint: `submit` resolves to the response status,
/// or to an error on transport failure (including a hung request the
/// platform eventually gives up on).
pub trait PurchaseEndpoint: Send + Sync {
  fn submit(&self, request: &PurchaseRequest) -> impl Future<Output = Result<u16>> + Send;
}

/// Caller-visible resolution of a purchase attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
  /// Confirmed by the remote peer.
  Delivered,
  /// Accepted locally and queued for delivery on reconnect.
  Deferred(PendingPurchase),
}

/// The ways a purchase attempt can fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
  /// Client-side rejection from the peer; not queued, not retried.
  Rejected { status: u16 },
  /// A purchase for the same game and user is already attempting.
  InFlight,
  /// The pending store could not persist the deferral.
  Store(String),
}

impl std::fmt::Display for PurchaseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PurchaseError::Rejected { status } => write!(f, "Purchase rejected with status {}", status),
      PurchaseError::InFlight => write!(f, "Purchase already in flight"),
      PurchaseError::Store(msg) => write!(f, "Failed to queue purchase: {}", msg),
    }
  }
}

impl std::error::Error for PurchaseError {}

/// Result of one replay pass over the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub delivered: usize,
  pub failed: usize,
}

/// Orchestrates purchase attempts and replays deferred ones when
/// connectivity returns.
pub struct PurchaseDispatcher<S: KeyValueStore, E: PurchaseEndpoint> {
  pending: PendingStore<S>,
  endpoint: E,
  monitor: ConnectivityMonitor,
  /// (game_id, user_id) pairs currently in the `Attempting` state.
  in_flight: Mutex<HashSet<(i64, i64)>>,
  sync_completed: EventBus<SyncReport>,
}

impl<S, E> PurchaseDispatcher<S, E>
where
  S: KeyValueStore + 'static,
  E: PurchaseEndpoint + 'static,
{
  pub fn new(store: Arc<S>, endpoint: E, monitor: ConnectivityMonitor) -> Self {
    Self {
      pending: PendingStore::new(store),
      endpoint,
      monitor,
      in_flight: Mutex::new(HashSet::new()),
      sync_completed: EventBus::new(),
    }
  }

  /// The queue of deferred purchases (for badges and diagnostics).
  pub fn pending(&self) -> &PendingStore<S> {
    &self.pending
  }

  /// Attempt a purchase.
  ///
  /// Returns `Deferred` when the purchase was queued for later delivery;
  /// that is a success from the caller's perspective. A second call for
  /// the same game and user while one is still attempting is rejected
  /// without side effects.
  pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseOutcome, PurchaseError> {
    let key = (request.game_id, request.user_id);
    {
      let mut in_flight = self
        .in_flight
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
      if !in_flight.insert(key) {
        return Err(PurchaseError::InFlight);
      }
    }

    let outcome = self.attempt(request).await;

    self
      .in_flight
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&key);

    outcome
  }

  async fn attempt(&self, request: PurchaseRequest) -> Result<PurchaseOutcome, PurchaseError> {
    if !self.monitor.is_online() {
      info!("Offline, deferring purchase of {}", request.game_name);
      return self.defer(request);
    }

    match self.endpoint.submit(&request).await {
      Ok(status) if (200..300).contains(&status) => {
        info!("Purchase of {} delivered", request.game_name);
        Ok(PurchaseOutcome::Delivered)
      }
      Ok(status) if status >= 500 => {
        warn!(
          "Server error {} for {}, deferring",
          status, request.game_name
        );
        self.defer(request)
      }
      Ok(status) => {
        warn!(
          "Purchase of {} rejected with status {}",
          request.game_name, status
        );
        Err(PurchaseError::Rejected { status })
      }
      Err(e) => {
        warn!(
          "Purchase submission for {} failed ({}), deferring",
          request.game_name, e
        );
        self.defer(request)
      }
    }
  }

  fn defer(&self, request: PurchaseRequest) -> Result<PurchaseOutcome, PurchaseError> {
    let pending = self
      .pending
      .enqueue(request)
      .map_err(|e| PurchaseError::Store(e.to_string()))?;
    Ok(PurchaseOutcome::Deferred(pending))
  }

  /// Attempt delivery for every currently queued entry, once each.
  ///
  /// Successful entries are removed; failed ones stay queued for the next
  /// online transition. The resulting report is published on the
  /// sync-completed bus when anything was attempted.
  pub async fn replay_pending(&self) -> SyncReport {
    let pending = match self.pending.list_pending() {
      Ok(pending) => pending,
      Err(e) => {
        warn!("Failed to list pending purchases: {}", e);
        return SyncReport::default();
      }
    };

    if pending.is_empty() {
      return SyncReport::default();
    }

    info!("Replaying {} deferred purchases", pending.len());
    let mut report = SyncReport::default();

    for entry in pending {
      match self.endpoint.submit(&entry.request()).await {
        Ok(status) if (200..300).contains(&status) => {
          if let Err(e) = self.pending.remove(&entry.id) {
            warn!("Failed to remove delivered purchase {}: {}", entry.id, e);
          }
          info!("Deferred purchase of {} delivered", entry.game_name);
          report.delivered += 1;
        }
        Ok(status) => {
          warn!("Replay of {} failed with status {}", entry.id, status);
          report.failed += 1;
        }
        Err(e) => {
          warn!("Replay of {} failed: {}", entry.id, e);
          report.failed += 1;
        }
      }
    }

    self.sync_completed.publish(&report);
    report
  }

  /// Subscribe to per-pass replay reports.
  pub fn on_sync_completed<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&SyncReport) + Send + Sync + 'static,
  {
    self.sync_completed.subscribe(callback)
  }

  /// Replay the queue on every online transition.
  ///
  /// Also drains once immediately when already online with entries
  /// queued from a previous page load. The replay task runs until the
  /// returned subscription is dropped.
  pub fn spawn_replay_on_reconnect(self: &Arc<Self>) -> Subscription {
    let (tx, mut rx) = mpsc::unbounded_channel();

    if self.monitor.is_online() && self.pending.has_pending().unwrap_or(false) {
      let _ = tx.send(());
    }

    let subscription = self.monitor.on_online(move || {
      let _ = tx.send(());
    });

    let dispatcher = Arc::clone(self);
    tokio::spawn(async move {
      while rx.recv().await.is_some() {
        dispatcher.replay_pending().await;
      }
    });

    subscription
  }

  /// Listen for purchase submissions published as application events.
  ///
  /// Both this entry point and direct `purchase` calls converge on the
  /// same state machine.
  pub fn attach_submission_bus(self: &Arc<Self>, bus: &EventBus<PurchaseRequest>) -> Subscription {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = bus.subscribe(move |request: &PurchaseRequest| {
      let _ = tx.send(request.clone());
    });

    let dispatcher = Arc::clone(self);
    tokio::spawn(async move {
      while let Some(request) = rx.recv().await {
        if let Err(e) = dispatcher.purchase(request).await {
          warn!("Event-submitted purchase failed: {}", e);
        }
      }
    });

    subscription
  }
}
