//! Coordination store adapter for the orca primitives.
//!
//! The primitives in `orca-coordination` never talk to a concrete store.
//! They consume the [`CoordinationStore`] trait defined here:
//!
//! - [`CoordinationStore`] - session-scoped node CRUD, one-shot children
//!   watches, and named per-transaction locks
//! - [`StoreError`] - result codes reported by adapters
//! - [`inmemory`] - a deterministic ensemble used by tests and embedders
//! - [`path`] - slash-delimited path helpers

pub mod error;
pub mod inmemory;
pub mod path;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use inmemory::InMemoryEnsemble;
pub use inmemory::InMemoryStore;
pub use traits::CoordinationStore;
pub use types::ChildWatch;
pub use types::CreateMode;
pub use types::Stat;
pub use types::WatchEventType;
pub use types::WatchedEvent;
