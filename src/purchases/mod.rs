//! Deferred purchase delivery.
//!
//! A purchase attempt either reaches the remote peer immediately or is
//! persisted as a pending entry and replayed when connectivity returns.
//! Delivery is at-least-once; deduplication is the peer's concern.

mod client;
mod dispatch;
mod pending;
mod types;

pub use client::HttpPurchaseEndpoint;
pub use dispatch::{PurchaseDispatcher, PurchaseEndpoint, PurchaseError, PurchaseOutcome, SyncReport};
pub use pending::PendingStore;
pub use types::{PaymentMethod, PendingPurchase, PurchaseRequest};
