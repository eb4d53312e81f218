//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orca::ConnectionRegistry;
use orca::InMemoryConnector;
use orca::Orca;
use orca::OrcaConfig;
use orca::store::InMemoryEnsemble;
use orca::store::InMemoryStore;

pub const TEST_NAMESPACE: &str = "nameA";
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").with_test_writer().try_init();
}

pub fn test_config() -> OrcaConfig {
    OrcaConfig::new(["localhost:2181"], TEST_NAMESPACE).with_timeout_ms(2_000)
}

/// A client with its own session on `ensemble`.
pub fn client(ensemble: &Arc<InMemoryEnsemble>) -> Arc<Orca<InMemoryStore>> {
    Arc::new(Orca::new(ensemble.connect(), test_config()).expect("valid test config"))
}

/// `count` clients, each with its own session on one ensemble.
pub fn cluster(count: usize) -> (Arc<InMemoryEnsemble>, Vec<Arc<Orca<InMemoryStore>>>) {
    let ensemble = InMemoryEnsemble::new();
    let clients = (0..count).map(|_| client(&ensemble)).collect();
    (ensemble, clients)
}

pub fn registry() -> ConnectionRegistry<InMemoryConnector> {
    ConnectionRegistry::new(InMemoryConnector::new(InMemoryEnsemble::new()))
}
