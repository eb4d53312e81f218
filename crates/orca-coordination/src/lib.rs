//! Distributed coordination primitives over a hierarchical coordination store.
//!
//! Independent processes use these to agree on shared state without a
//! coordinator of their own; consistency is delegated to the store.
//!
//! ## Primitives
//!
//! - [`AtomicCounter`] - integer counters mutated under a per-key store lock
//! - [`GroupMonitor`] - zone membership from ephemeral connection nodes,
//!   with a per-zone event stream
//! - Primary election - [`GroupMonitor::is_primary`], the oldest live
//!   connection of an agent
//! - [`DoubleBarrier`] - rendezvous of a fixed-size cohort at a path
//!
//! [`Orca`] bundles them over one session and [`ConnectionRegistry`]
//! shares one `Orca` per configuration.
//!
//! ## Example
//!
//! ```ignore
//! use orca_coordination::{InMemoryConnector, ConnectionRegistry, OrcaConfig};
//! use orca_store::InMemoryEnsemble;
//!
//! let registry = ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()));
//! let orca = registry.get_or_create(OrcaConfig::new(["localhost:2181"], "nameA")).await?;
//! let value = orca.increment_and_get("jobs/processed", "worker-1").await?;
//! registry.shutdown_all().await;
//! ```

pub mod barrier;
pub mod config;
mod connection;
pub mod constants;
pub mod counter;
mod election;
pub mod error;
pub mod lock;
pub mod orca;
pub mod paths;
pub mod presence;
pub mod pure;
pub mod registry;

pub use barrier::BarrierEntry;
pub use barrier::BarrierStage;
pub use barrier::DoubleBarrier;
pub use config::ConfigError;
pub use config::OrcaConfig;
pub use counter::AtomicCounter;
pub use error::CoordinationError;
pub use lock::LockGuard;
pub use orca::Orca;
pub use paths::Namespace;
pub use presence::GroupMonitor;
pub use presence::ZoneEvent;
pub use presence::ZoneId;
pub use registry::ConnectionRegistry;
pub use registry::InMemoryConnector;
pub use registry::StoreConnector;
