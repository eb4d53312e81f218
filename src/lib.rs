//! Coordination primitives for cluster processes sharing a ZooKeeper-style
//! store: group presence, primary election, double barriers and atomic
//! counters.
//!
//! This crate re-exports the workspace crates:
//!
//! - [`store`] - the store adapter trait, its error codes, and an in-memory ensemble
//! - [`coordination`] - the primitives, the [`Orca`] client and the [`ConnectionRegistry`]
//!
//! ```ignore
//! use orca::{ConnectionRegistry, InMemoryConnector, OrcaConfig, ZoneId};
//! use orca::store::InMemoryEnsemble;
//!
//! let registry = ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()));
//! let orca = registry.get_or_create(OrcaConfig::load()?).await?;
//!
//! let zone = ZoneId::new("acOne", "testZone2");
//! let mine = orca.add_node(&zone, "agentId1", &connection_guid).await?;
//! if orca.is_primary(&zone, "agentId1", &mine).await? {
//!     // act for the agent
//! }
//! ```

pub use orca_coordination as coordination;
pub use orca_coordination::AtomicCounter;
pub use orca_coordination::BarrierEntry;
pub use orca_coordination::BarrierStage;
pub use orca_coordination::ConfigError;
pub use orca_coordination::ConnectionRegistry;
pub use orca_coordination::CoordinationError;
pub use orca_coordination::DoubleBarrier;
pub use orca_coordination::GroupMonitor;
pub use orca_coordination::InMemoryConnector;
pub use orca_coordination::Orca;
pub use orca_coordination::OrcaConfig;
pub use orca_coordination::StoreConnector;
pub use orca_coordination::ZoneEvent;
pub use orca_coordination::ZoneId;
pub use orca_store as store;
pub use orca_store::CoordinationStore;
pub use orca_store::StoreError;
