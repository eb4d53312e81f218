//! Primary election among an agent's connections.
//!
//! An agent may hold several connections to the same zone. Exactly one of
//! them is primary: the live connection node with the smallest sequence
//! suffix. When it disappears the next oldest takes over with no extra
//! coordination, since the ordering is derived from the membership snapshot.

use orca_store::CoordinationStore;
use tracing::debug;

use crate::error::CoordinationError;
use crate::presence::GroupMonitor;
use crate::presence::ZoneId;
use crate::pure;

impl<S: CoordinationStore + ?Sized + 'static> GroupMonitor<S> {
    /// Name of the primary connection node for `agent_id`, if it has any.
    pub async fn primary_connection(&self, zone: &ZoneId, agent_id: &str) -> Result<Option<String>, CoordinationError> {
        let groups = self.get_connections(zone).await?;
        Ok(groups.get(agent_id).and_then(|connections| pure::select_primary(connections)).map(str::to_string))
    }

    /// Whether `my_path` is the primary connection of `agent_id` in `zone`.
    ///
    /// False if the agent has no live connections.
    pub async fn is_primary(&self, zone: &ZoneId, agent_id: &str, my_path: &str) -> Result<bool, CoordinationError> {
        let groups = self.get_connections(zone).await?;
        let Some(connections) = groups.get(agent_id) else {
            debug!(zone = %zone, agent_id, "agent has no live connections");
            return Ok(false);
        };
        Ok(pure::is_primary_connection(connections, my_path))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use orca_store::CreateMode;
    use orca_store::InMemoryEnsemble;

    use super::*;
    use crate::paths::Namespace;

    #[tokio::test]
    async fn oldest_connection_is_primary() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = GroupMonitor::new(ensemble.connect(), Namespace::new("nameA"), Duration::from_millis(500));
        let zone = ZoneId::new("acOne", "z");

        let first = monitor.add_node(&zone, "agent", "g1").await.unwrap();
        let second = monitor.add_node(&zone, "agent", "g2").await.unwrap();
        let other = monitor.add_node(&zone, "other", "g3").await.unwrap();

        assert!(monitor.is_primary(&zone, "agent", &first).await.unwrap());
        assert!(!monitor.is_primary(&zone, "agent", &second).await.unwrap());
        assert!(monitor.is_primary(&zone, "other", &other).await.unwrap());

        monitor.remove_node(&first).await.unwrap();
        assert!(monitor.is_primary(&zone, "agent", &second).await.unwrap());
        assert_eq!(
            monitor.primary_connection(&zone, "agent").await.unwrap().as_deref(),
            Some(orca_store::path::basename(&second))
        );
    }

    #[tokio::test]
    async fn ordering_uses_sequence_numbers() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        let dir = "/nameA/ac/z/connections";
        store.create_recursive(dir).await.unwrap();
        for suffix in ["0000000005", "0000000002", "0000000009"] {
            let path = format!("{dir}/agent:g{suffix}:{suffix}");
            store.create(&path, Vec::new(), CreateMode::Ephemeral).await.unwrap();
        }
        let monitor = GroupMonitor::new(Arc::clone(&store), Namespace::new("nameA"), Duration::from_millis(500));
        let zone = ZoneId::new("ac", "z");

        assert!(monitor.is_primary(&zone, "agent", &format!("{dir}/agent:g0000000002:0000000002")).await.unwrap());
        assert!(!monitor.is_primary(&zone, "agent", &format!("{dir}/agent:g0000000005:0000000005")).await.unwrap());
        assert!(!monitor.is_primary(&zone, "agent", &format!("{dir}/agent:g0000000009:0000000009")).await.unwrap());
    }

    #[tokio::test]
    async fn absent_agent_is_never_primary() {
        let ensemble = InMemoryEnsemble::new();
        let monitor = GroupMonitor::new(ensemble.connect(), Namespace::new("nameA"), Duration::from_millis(500));
        let zone = ZoneId::new("ac", "z");
        assert!(!monitor.is_primary(&zone, "ghost", "/nameA/ac/z/connections/ghost:g:0000000000").await.unwrap());
        assert_eq!(monitor.primary_connection(&zone, "ghost").await.unwrap(), None);
    }
}
