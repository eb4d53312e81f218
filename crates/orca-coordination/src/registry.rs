//! Process-wide cache of clients keyed by configuration.
//!
//! Callers asking for the same configuration share one session, so one
//! process holds one set of ephemeral nodes per ensemble and namespace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use orca_store::InMemoryEnsemble;
use orca_store::InMemoryStore;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::OrcaConfig;
use crate::error::CoordinationError;
use crate::orca::Orca;

/// Opens store sessions for a configuration.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Session type produced by this connector.
    type Store: orca_store::CoordinationStore + 'static;

    /// Open a session to the ensemble named by `config`.
    async fn connect(&self, config: &OrcaConfig) -> Result<Arc<Self::Store>, CoordinationError>;
}

/// Connects every configuration to one in-process ensemble.
#[derive(Clone)]
pub struct InMemoryConnector {
    ensemble: Arc<InMemoryEnsemble>,
}

impl InMemoryConnector {
    pub fn new(ensemble: Arc<InMemoryEnsemble>) -> Self {
        Self { ensemble }
    }

    pub fn ensemble(&self) -> &Arc<InMemoryEnsemble> {
        &self.ensemble
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    type Store = InMemoryStore;

    async fn connect(&self, config: &OrcaConfig) -> Result<Arc<InMemoryStore>, CoordinationError> {
        let store = self.ensemble.connect();
        debug!(connect_string = %config.connect_string(), session_id = store.session_id(), "opened in-memory session");
        Ok(store)
    }
}

/// Cache of [`Orca`] clients, one per distinct configuration.
pub struct ConnectionRegistry<C: StoreConnector> {
    connector: C,
    clients: Mutex<HashMap<OrcaConfig, Arc<Orca<C::Store>>>>,
}

impl<C: StoreConnector> ConnectionRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached client for `config`, connecting on first use.
    ///
    /// Concurrent first calls may both connect; the first to finish is
    /// cached and the other session is closed.
    pub async fn get_or_create(&self, config: OrcaConfig) -> Result<Arc<Orca<C::Store>>, CoordinationError> {
        config.validate()?;
        if let Some(existing) = self.clients.lock().get(&config) {
            return Ok(Arc::clone(existing));
        }

        let store = self.connector.connect(&config).await?;
        let client = Arc::new(Orca::new(store, config.clone())?);

        let (winner, loser) = {
            let mut clients = self.clients.lock();
            match clients.get(&config) {
                Some(existing) => (Arc::clone(existing), Some(client)),
                None => {
                    clients.insert(config.clone(), Arc::clone(&client));
                    (client, None)
                }
            }
        };

        if let Some(loser) = loser {
            debug!(connect_string = %config.connect_string(), "lost connect race, closing duplicate session");
            if let Err(e) = loser.close().await {
                warn!(connect_string = %config.connect_string(), error = %e, "failed to close duplicate session");
            }
        } else {
            info!(connect_string = %config.connect_string(), name = %config.name, "orca client created");
        }
        Ok(winner)
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Close and forget every cached client.
    ///
    /// Close failures are logged, never returned; every client is attempted.
    pub async fn shutdown_all(&self) {
        let clients: Vec<_> = self.clients.lock().drain().collect();
        let count = clients.len();
        let results = futures::future::join_all(clients.iter().map(|(_, client)| client.close())).await;

        for ((config, _), result) in clients.iter().zip(results) {
            if let Err(e) = result {
                warn!(connect_string = %config.connect_string(), error = %e, "error closing orca client");
            }
        }
        info!(clients = count, "connection registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> OrcaConfig {
        OrcaConfig::new(["localhost:2181", "localhost:2182"], name).with_timeout_ms(500)
    }

    #[tokio::test]
    async fn same_config_reuses_client() {
        let registry = ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()));

        let a = registry.get_or_create(config("nameA")).await.unwrap();
        let b = registry.get_or_create(config("nameA")).await.unwrap();
        let c = registry.get_or_create(config("nameB")).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.store().session_id(), b.store().session_id());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_closes_and_clears() {
        let registry = ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()));
        let a = registry.get_or_create(config("nameA")).await.unwrap();
        let b = registry.get_or_create(config("nameB")).await.unwrap();

        registry.shutdown_all().await;
        assert!(registry.is_empty());
        assert!(a.store().is_closed());
        assert!(b.store().is_closed());

        let fresh = registry.get_or_create(config("nameA")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &fresh));
    }

    #[tokio::test]
    async fn shutdown_tolerates_already_closed_clients() {
        let registry = ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()));
        let a = registry.get_or_create(config("nameA")).await.unwrap();
        a.close().await.unwrap();

        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_connecting() {
        let registry = ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()));
        let result = registry.get_or_create(OrcaConfig::new(["localhost:2181"], "a/b")).await;
        assert!(matches!(result, Err(CoordinationError::Config { .. })));
        assert!(registry.is_empty());
    }
}
