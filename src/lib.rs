//! Offline resilience for the game store client.
//!
//! Purchases made without connectivity (or against a failing server) are
//! queued in a persistent store and replayed when the connection returns.
//! Remotely fetched images are kept in a size-bounded persistent cache so
//! previously viewed content stays available offline. A background worker's
//! lifecycle (registration, updates, cache control) is coordinated through
//! an explicit runtime seam so the host page keeps working without one.

pub mod config;
pub mod connectivity;
pub mod events;
pub mod images;
pub mod purchases;
pub mod storage;
pub mod worker;

pub use config::SyncConfig;
pub use connectivity::ConnectivityMonitor;
pub use events::{EventBus, Subscription};
pub use images::ImageCache;
pub use purchases::{PendingStore, PurchaseDispatcher, PurchaseOutcome};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
