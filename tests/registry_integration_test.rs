//! Connection reuse and process shutdown.

mod support;

use std::sync::Arc;

use futures::future::join_all;
use orca::OrcaConfig;
use orca::ZoneId;
use support::init_tracing;
use support::registry;
use support::test_config;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_session() {
    init_tracing();
    let registry = registry();

    let clients = join_all((0..8).map(|_| registry.get_or_create(test_config()))).await;
    let clients: Vec<_> = clients.into_iter().map(Result::unwrap).collect();

    assert!(clients.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_shutdown_releases_ephemeral_state() {
    init_tracing();
    let registry = registry();
    let orca = registry.get_or_create(test_config()).await.unwrap();
    let other = registry.get_or_create(OrcaConfig::new(["localhost:2181"], "nameB")).await.unwrap();

    let zone = ZoneId::new("acOne", "z");
    let node = orca.add_node(&zone, "agent", "guid").await.unwrap();
    let ensemble = Arc::clone(orca.store().ensemble());
    assert!(ensemble.contains(&node));

    registry.shutdown_all().await;
    assert!(registry.is_empty());
    assert!(!ensemble.contains(&node));
    assert!(orca.store().is_closed());
    assert!(other.store().is_closed());

    // Shutting down twice is harmless.
    registry.shutdown_all().await;
}
