//! Group presence monitoring.
//!
//! Every agent connection registers an ephemeral, sequential node under
//! `/<ns>/<account>/<zone>/connections/`. A [`GroupMonitor`] watches that
//! directory and publishes a [`ZoneEvent`] stream per zone.
//!
//! Store watches fire once. The monitor task re-registers the watch
//! *before* publishing each change, so a change landing between two
//! notifications is never lost.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use orca_store::CoordinationStore;
use orca_store::CreateMode;
use orca_store::StoreError;
use orca_store::WatchedEvent;
use orca_store::path;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::connection::wait_for_connection;
use crate::constants::CONNECTION_NAME_DELIMITER;
use crate::constants::ZONE_EVENT_CHANNEL_CAPACITY;
use crate::error::CoordinationError;
use crate::paths::Namespace;
use crate::pure;

/// Identity of a monitored group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId {
    /// Tenant account.
    pub account_key: String,
    /// Zone within the account.
    pub zone_name: String,
}

impl ZoneId {
    /// Create a zone identity.
    pub fn new(account_key: impl Into<String>, zone_name: impl Into<String>) -> Self {
        Self {
            account_key: account_key.into(),
            zone_name: zone_name.into(),
        }
    }

    /// Name of the membership-changed event, `zone:<account>:<zone>`.
    pub fn zone_event_id(&self) -> String {
        format!("zone:{}:{}", self.account_key, self.zone_name)
    }

    /// Name of the watch-armed event, `monitor:<account>:<zone>`.
    pub fn monitor_event_id(&self) -> String {
        format!("monitor:{}:{}", self.account_key, self.zone_name)
    }

    fn validate(&self) -> Result<(), CoordinationError> {
        validate_segment("account_key", &self.account_key)?;
        validate_segment("zone_name", &self.zone_name)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account_key, self.zone_name)
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), CoordinationError> {
    if value.is_empty() || value.contains(path::SEPARATOR) || value.contains(CONNECTION_NAME_DELIMITER) {
        return Err(CoordinationError::InvalidArgument {
            reason: format!("{field} '{value}' must be non-empty and contain neither '/' nor ':'"),
        });
    }
    Ok(())
}

/// Notification published for a monitored zone.
#[derive(Debug, Clone)]
pub enum ZoneEvent {
    /// The first watch is registered. Sent once per monitor task.
    Armed,
    /// Membership changed. Carries the raw watch notification.
    Changed(WatchedEvent),
    /// The watch could not be registered; the monitor task has stopped.
    Failed(CoordinationError),
}

/// A running zone monitor.
struct ZoneMonitor {
    events: broadcast::Sender<ZoneEvent>,
    task: JoinHandle<()>,
}

/// Watches connection directories and answers membership queries.
pub struct GroupMonitor<S: CoordinationStore + ?Sized + 'static> {
    store: Arc<S>,
    namespace: Namespace,
    timeout: Duration,
    zones: Mutex<HashMap<ZoneId, ZoneMonitor>>,
    shutdown: Mutex<CancellationToken>,
}

impl<S: CoordinationStore + ?Sized + 'static> GroupMonitor<S> {
    /// Create a monitor. `timeout` bounds each wait for store connectivity.
    pub fn new(store: Arc<S>, namespace: Namespace, timeout: Duration) -> Self {
        Self {
            store,
            namespace,
            timeout,
            zones: Mutex::new(HashMap::new()),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Start monitoring `zone` and subscribe to its events.
    ///
    /// Idempotent: if the zone is already monitored this only subscribes, and
    /// the new receiver will not see the `Armed` event already sent. Wait for
    /// [`ZoneEvent::Armed`] before creating nodes whose arrival you need to
    /// observe. Must be called from within a Tokio runtime.
    pub fn monitor(&self, zone: &ZoneId) -> Result<broadcast::Receiver<ZoneEvent>, CoordinationError> {
        zone.validate()?;
        let mut zones = self.zones.lock();
        if let Some(existing) = zones.get(zone)
            && !existing.task.is_finished()
        {
            trace!(zone = %zone, "zone already monitored");
            return Ok(existing.events.subscribe());
        }

        let (events, receiver) = broadcast::channel(ZONE_EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_zone_monitor(
            Arc::clone(&self.store),
            zone.clone(),
            self.namespace.zone_connections(zone),
            self.timeout,
            events.clone(),
            self.shutdown.lock().child_token(),
        ));
        zones.insert(zone.clone(), ZoneMonitor { events, task });
        Ok(receiver)
    }

    /// Returns true while a monitor task is running for `zone`.
    pub fn is_monitoring(&self, zone: &ZoneId) -> bool {
        self.zones.lock().get(zone).is_some_and(|monitor| !monitor.task.is_finished())
    }

    /// Current connections in `zone`, grouped by agent id, oldest first.
    ///
    /// A zone with no connections directory yet has no members.
    pub async fn get_connections(&self, zone: &ZoneId) -> Result<BTreeMap<String, Vec<String>>, CoordinationError> {
        zone.validate()?;
        wait_for_connection(&*self.store, self.timeout).await?;

        let dir = self.namespace.zone_connections(zone);
        match self.store.get_children(&dir).await {
            Ok(children) => Ok(pure::group_by_agent(children)),
            Err(StoreError::NoNode { .. }) => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Register a connection for `agent_id`, returning the node path.
    ///
    /// The node is ephemeral: it disappears with this session.
    pub async fn add_node(
        &self,
        zone: &ZoneId,
        agent_id: &str,
        connection_guid: &str,
    ) -> Result<String, CoordinationError> {
        zone.validate()?;
        validate_segment("agent_id", agent_id)?;
        if connection_guid.is_empty() || connection_guid.contains(path::SEPARATOR) {
            return Err(CoordinationError::InvalidArgument {
                reason: format!("connection_guid '{connection_guid}' must be non-empty and contain no '/'"),
            });
        }
        wait_for_connection(&*self.store, self.timeout).await?;

        let dir = self.namespace.zone_connections(zone);
        self.store.create_recursive(&dir).await?;
        let prefix = path::join(&dir, &pure::connection_node_prefix(agent_id, connection_guid));
        let node_path = self.store.create(&prefix, Vec::new(), CreateMode::EphemeralSequential).await?;

        debug!(zone = %zone, agent_id, path = %node_path, "connection node added");
        Ok(node_path)
    }

    /// Delete a connection node regardless of its version.
    pub async fn remove_node(&self, node_path: &str) -> Result<(), CoordinationError> {
        wait_for_connection(&*self.store, self.timeout).await?;
        self.store.remove(node_path, None).await?;
        debug!(path = %node_path, "connection node removed");
        Ok(())
    }

    /// Stop every monitor task. Zones may be monitored again afterwards.
    pub fn stop_all(&self) {
        let token = std::mem::replace(&mut *self.shutdown.lock(), CancellationToken::new());
        token.cancel();
        let stopped = self.zones.lock().drain().count();
        if stopped > 0 {
            info!(zones = stopped, "zone monitors stopped");
        }
    }
}

impl<S: CoordinationStore + ?Sized + 'static> Drop for GroupMonitor<S> {
    fn drop(&mut self) {
        self.shutdown.lock().cancel();
    }
}

async fn run_zone_monitor<S>(
    store: Arc<S>,
    zone: ZoneId,
    dir: String,
    timeout: Duration,
    events: broadcast::Sender<ZoneEvent>,
    cancel: CancellationToken,
) where
    S: CoordinationStore + ?Sized,
{
    let result = tokio::select! {
        _ = cancel.cancelled() => {
            trace!(zone = %zone, "zone monitor cancelled");
            return;
        }
        result = watch_zone(&*store, &zone, &dir, timeout, &events) => result,
    };

    if let Err(e) = result {
        warn!(zone = %zone, error = %e, "zone monitor stopped");
        // No receivers is fine; the failure is still logged.
        let _ = events.send(ZoneEvent::Failed(e));
    }
}

async fn watch_zone<S>(
    store: &S,
    zone: &ZoneId,
    dir: &str,
    timeout: Duration,
    events: &broadcast::Sender<ZoneEvent>,
) -> Result<(), CoordinationError>
where
    S: CoordinationStore + ?Sized,
{
    wait_for_connection(store, timeout).await?;
    store.create_recursive(dir).await?;

    let (children, mut watch) = store.get_children_watch(dir).await?;
    debug!(zone = %zone, members = children.len(), "zone monitor armed");
    let _ = events.send(ZoneEvent::Armed);

    loop {
        let event = watch.fired().await;
        trace!(zone = %zone, ?event, "zone watch fired");

        // Re-arm before handing the change to subscribers.
        let rearmed = store.get_children_watch(dir).await;
        let _ = events.send(ZoneEvent::Changed(event));
        let (_, next) = rearmed?;
        watch = next;
    }
}

#[cfg(test)]
mod tests {
    use orca_store::InMemoryEnsemble;
    use orca_store::WatchEventType;

    use super::*;

    fn monitor_for(ensemble: &Arc<InMemoryEnsemble>) -> GroupMonitor<orca_store::InMemoryStore> {
        GroupMonitor::new(ensemble.connect(), Namespace::new("nameA"), Duration::from_millis(500))
    }

    #[test]
    fn event_ids_match_wire_names() {
        let zone = ZoneId::new("acOne", "testZone2");
        assert_eq!(zone.zone_event_id(), "zone:acOne:testZone2");
        assert_eq!(zone.monitor_event_id(), "monitor:acOne:testZone2");
        assert_eq!(zone.to_string(), "acOne:testZone2");
    }

    #[tokio::test]
    async fn add_node_names_connection_by_agent_and_guid() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let zone = ZoneId::new("acOne", "z");

        let path = monitor.add_node(&zone, "agentId1", "guid-1").await.unwrap();
        assert_eq!(path, "/nameA/acOne/z/connections/agentId1:guid-1:0000000000");

        let groups = monitor.get_connections(&zone).await.unwrap();
        assert_eq!(groups["agentId1"], vec!["agentId1:guid-1:0000000000".to_string()]);
    }

    #[tokio::test]
    async fn connections_are_listed_oldest_first() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let zone = ZoneId::new("acOne", "z");

        let older = monitor.add_node(&zone, "agent", "zzz").await.unwrap();
        let newer = monitor.add_node(&zone, "agent", "aaa").await.unwrap();

        let groups = monitor.get_connections(&zone).await.unwrap();
        assert_eq!(groups["agent"], vec![path::basename(&older).to_string(), path::basename(&newer).to_string()]);
        assert_eq!(monitor.primary_connection(&zone, "agent").await.unwrap().as_deref(), Some(path::basename(&older)));
    }

    #[tokio::test]
    async fn unknown_zone_has_no_connections() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let groups = monitor.get_connections(&ZoneId::new("ac", "empty")).await.unwrap();
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn malformed_identifiers_are_rejected() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let zone = ZoneId::new("ac", "z");

        assert!(monitor.add_node(&zone, "agent:1", "g").await.is_err());
        assert!(monitor.add_node(&zone, "agent", "").await.is_err());
        assert!(monitor.monitor(&ZoneId::new("a/b", "z")).is_err());
    }

    #[tokio::test]
    async fn monitor_rearms_after_each_change() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let zone = ZoneId::new("acOne", "rearm");

        let mut events = monitor.monitor(&zone).unwrap();
        assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Armed));

        let first = monitor.add_node(&zone, "agent", "g1").await.unwrap();
        match events.recv().await.unwrap() {
            ZoneEvent::Changed(event) => assert_eq!(event.event_type, WatchEventType::NodeChildrenChanged),
            other => panic!("expected change, got {other:?}"),
        }

        monitor.add_node(&zone, "agent", "g2").await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Changed(_)));

        monitor.remove_node(&first).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Changed(_)));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn monitor_is_idempotent_per_zone() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let zone = ZoneId::new("acOne", "twice");

        let mut first = monitor.monitor(&zone).unwrap();
        assert!(matches!(first.recv().await.unwrap(), ZoneEvent::Armed));
        let mut second = monitor.monitor(&zone).unwrap();

        monitor.add_node(&zone, "agent", "g").await.unwrap();
        assert!(matches!(first.recv().await.unwrap(), ZoneEvent::Changed(_)));
        assert!(matches!(second.recv().await.unwrap(), ZoneEvent::Changed(_)));
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_all_ends_monitor_tasks() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = monitor_for(&ensemble);
        let zone = ZoneId::new("acOne", "stop");

        let mut events = monitor.monitor(&zone).unwrap();
        assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Armed));
        assert!(monitor.is_monitoring(&zone));

        monitor.stop_all();
        assert!(!monitor.is_monitoring(&zone));
        assert!(matches!(events.recv().await, Err(broadcast::error::RecvError::Closed)));
    }
}
