//! Client handle bundling every primitive over one store session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use orca_store::CoordinationStore;
use tracing::info;

use crate::barrier::BarrierEntry;
use crate::barrier::DoubleBarrier;
use crate::config::OrcaConfig;
use crate::counter::AtomicCounter;
use crate::error::CoordinationError;
use crate::paths::Namespace;
use crate::presence::GroupMonitor;
use crate::presence::ZoneEvent;
use crate::presence::ZoneId;

/// Coordination client for one configuration.
///
/// Cheap to share behind an `Arc`; every primitive uses the same session.
pub struct Orca<S: CoordinationStore + ?Sized + 'static> {
    store: Arc<S>,
    config: OrcaConfig,
    counter: AtomicCounter<S>,
    barrier: DoubleBarrier<S>,
    presence: GroupMonitor<S>,
}

impl<S: CoordinationStore + ?Sized + 'static> Orca<S> {
    /// Build a client over an open store session.
    pub fn new(store: Arc<S>, config: OrcaConfig) -> Result<Self, CoordinationError> {
        config.validate()?;
        let namespace = Namespace::new(&config.name);
        let timeout = config.timeout();
        Ok(Self {
            counter: AtomicCounter::new(Arc::clone(&store), namespace.clone(), timeout),
            barrier: DoubleBarrier::new(Arc::clone(&store), timeout),
            presence: GroupMonitor::new(Arc::clone(&store), namespace, timeout),
            store,
            config,
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &OrcaConfig {
        &self.config
    }

    /// The underlying store session.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn counter(&self) -> &AtomicCounter<S> {
        &self.counter
    }

    pub fn barrier(&self) -> &DoubleBarrier<S> {
        &self.barrier
    }

    pub fn presence(&self) -> &GroupMonitor<S> {
        &self.presence
    }

    // Presence and election

    /// See [`GroupMonitor::monitor`].
    pub fn monitor(&self, zone: &ZoneId) -> Result<tokio::sync::broadcast::Receiver<ZoneEvent>, CoordinationError> {
        self.presence.monitor(zone)
    }

    pub async fn get_connections(&self, zone: &ZoneId) -> Result<BTreeMap<String, Vec<String>>, CoordinationError> {
        self.presence.get_connections(zone).await
    }

    pub async fn add_node(
        &self,
        zone: &ZoneId,
        agent_id: &str,
        connection_guid: &str,
    ) -> Result<String, CoordinationError> {
        self.presence.add_node(zone, agent_id, connection_guid).await
    }

    pub async fn remove_node(&self, node_path: &str) -> Result<(), CoordinationError> {
        self.presence.remove_node(node_path).await
    }

    pub async fn is_primary(&self, zone: &ZoneId, agent_id: &str, my_path: &str) -> Result<bool, CoordinationError> {
        self.presence.is_primary(zone, agent_id, my_path).await
    }

    // Counters

    /// Read a counter. With a default, an absent counter is initialized to it;
    /// without one, an absent counter is `NotFound`.
    pub async fn get(&self, key: &str, default_value: Option<i64>) -> Result<i64, CoordinationError> {
        match default_value {
            Some(default_value) => self.counter.get_or_init(key, default_value).await,
            None => self.counter.get(key).await,
        }
    }

    pub async fn increment_and_get(&self, key: &str, transaction_id: &str) -> Result<i64, CoordinationError> {
        self.counter.increment_and_get(key, transaction_id).await
    }

    pub async fn increment_and_get_by(
        &self,
        key: &str,
        delta: i64,
        transaction_id: &str,
    ) -> Result<i64, CoordinationError> {
        self.counter.increment_and_get_by(key, delta, transaction_id).await
    }

    pub async fn decrement_and_get(&self, key: &str, transaction_id: &str) -> Result<i64, CoordinationError> {
        self.counter.decrement_and_get(key, transaction_id).await
    }

    pub async fn decrement_and_get_by(
        &self,
        key: &str,
        amount: i64,
        transaction_id: &str,
    ) -> Result<i64, CoordinationError> {
        self.counter.decrement_and_get_by(key, amount, transaction_id).await
    }

    // Barriers

    /// See [`DoubleBarrier::enter`].
    pub async fn double_barrier_enter(
        &self,
        barrier_path: &str,
        client_count: u32,
        timeout: Option<Duration>,
    ) -> Result<BarrierEntry, CoordinationError> {
        self.barrier.enter(barrier_path, client_count, timeout).await
    }

    pub async fn double_barrier_leave(&self, participant_path: &str) -> Result<(), CoordinationError> {
        self.barrier.leave(participant_path).await
    }

    /// Stop all monitors and close the session.
    ///
    /// Ephemeral nodes owned by the session (connections, barrier
    /// participants) go away with it.
    pub async fn close(&self) -> Result<(), CoordinationError> {
        self.presence.stop_all();
        self.store.close().await?;
        info!(connect_string = %self.config.connect_string(), name = %self.config.name, "orca client closed");
        Ok(())
    }
}
