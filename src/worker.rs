//! Background worker lifecycle coordination.
//!
//! The worker intercepts network activity independently of the page, so
//! this module only registers it, observes its lifecycle and exchanges
//! control messages. Everything here is additive: registration and
//! unregistration failures are reported but never block the page, which
//! must function with no worker installed at all.

use color_eyre::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::events::{EventBus, Subscription};

/// Fire-and-forget control messages for the active worker. No response is
/// awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
  /// Activate an installed-but-waiting update.
  SkipWaiting,
  /// Tell the worker to purge its own cache.
  ClearCache,
}

/// Lifecycle signals observed from the platform's worker container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
  /// A new worker version is installed and waiting to activate.
  UpdateAvailable,
  /// A different worker instance took control of the page.
  ControllerChanged,
}

/// Platform seam for the worker container.
pub trait WorkerRuntime: Send + Sync {
  fn register(&self, script_url: &str) -> impl Future<Output = Result<()>> + Send;

  /// Remove the registration entirely. Returns whether one was removed.
  fn unregister(&self) -> impl Future<Output = Result<bool>> + Send;

  fn post_message(&self, command: WorkerCommand) -> Result<()>;
}

/// Coordinates one worker registration per page load.
///
/// The page-reload side effect of a controller change is an explicit
/// host-provided callback rather than something performed unilaterally,
/// so hosts (and tests) observe the intent.
pub struct WorkerLifecycle<R: WorkerRuntime> {
  runtime: R,
  script_url: String,
  registered: AtomicBool,
  reloading: AtomicBool,
  update_available: EventBus<()>,
  reload: Box<dyn Fn() + Send + Sync>,
}

impl<R: WorkerRuntime> WorkerLifecycle<R> {
  pub fn new<F>(runtime: R, script_url: impl Into<String>, reload: F) -> Self
  where
    F: Fn() + Send + Sync + 'static,
  {
    Self {
      runtime,
      script_url: script_url.into(),
      registered: AtomicBool::new(false),
      reloading: AtomicBool::new(false),
      update_available: EventBus::new(),
      reload: Box::new(reload),
    }
  }

  /// Register the worker. Runs at most once per instance; later calls
  /// are no-ops. Returns whether this call performed a registration.
  pub async fn register(&self) -> bool {
    if self.registered.swap(true, Ordering::SeqCst) {
      return false;
    }

    match self.runtime.register(&self.script_url).await {
      Ok(()) => {
        info!("Background worker registered from {}", self.script_url);
        true
      }
      Err(e) => {
        // Non-fatal: the page works without a worker
        error!("Background worker registration failed: {}", e);
        false
      }
    }
  }

  /// Feed a lifecycle signal observed from the platform.
  pub fn observe(&self, event: WorkerEvent) {
    match event {
      WorkerEvent::UpdateAvailable => {
        info!("Background worker update available");
        self.update_available.publish(&());
      }
      WorkerEvent::ControllerChanged => {
        // One-shot: a second controller change before the reload
        // completes must not reload again
        if !self.reloading.swap(true, Ordering::SeqCst) {
          info!("Worker controller changed, reloading");
          (self.reload)();
        }
      }
    }
  }

  /// Subscribe to "a new worker version is waiting" signals. The UI
  /// decides whether to prompt the user.
  pub fn on_update_available<F>(&self, callback: F) -> Subscription
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.update_available.subscribe(move |_| callback())
  }

  /// Ask a waiting update to activate.
  pub fn activate_update(&self) {
    if let Err(e) = self.runtime.post_message(WorkerCommand::SkipWaiting) {
      warn!("Failed to request worker activation: {}", e);
    }
  }

  /// Tell the active worker to purge its own cache.
  pub fn clear_worker_cache(&self) {
    if let Err(e) = self.runtime.post_message(WorkerCommand::ClearCache) {
      warn!("Failed to request worker cache clear: {}", e);
    }
  }

  /// Remove the registration (diagnostics/reset flows). Returns whether
  /// a registration was removed; failures are reported, not fatal.
  pub async fn unregister(&self) -> bool {
    match self.runtime.unregister().await {
      Ok(removed) => removed,
      Err(e) => {
        error!("Background worker unregistration failed: {}", e);
        false
      }
    }
  }
}
