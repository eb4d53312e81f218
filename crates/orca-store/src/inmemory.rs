//! Deterministic in-memory coordination ensemble.
//!
//! An [`InMemoryEnsemble`] holds one node tree shared by any number of
//! [`InMemoryStore`] sessions. It implements the semantics the coordination
//! primitives depend on:
//!
//! - ephemeral nodes are deleted when their session closes
//! - sequential nodes get a 10-digit zero-padded suffix, unique per parent
//! - children watches fire once and must be re-registered
//! - named locks are reentrant per transaction id and released with the session
//!
//! Sessions can be flipped between connected and disconnected to exercise
//! connection timeouts.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;

use crate::error::StoreError;
use crate::path;
use crate::traits::CoordinationStore;
use crate::types::ChildWatch;
use crate::types::CreateMode;
use crate::types::Stat;
use crate::types::WatchEventType;
use crate::types::WatchedEvent;

/// A stored node.
struct Node {
    data: Vec<u8>,
    version: i32,
    /// Owning session for ephemeral nodes, 0 for persistent ones.
    ephemeral_owner: u64,
    children: BTreeSet<String>,
    /// Next sequence suffix handed to a sequential child.
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: u64) -> Self {
        Self {
            data,
            version: 0,
            ephemeral_owner,
            children: BTreeSet::new(),
            next_sequence: 0,
        }
    }

    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            num_children: self.children.len() as u32,
            ephemeral_owner: self.ephemeral_owner,
        }
    }
}

/// A registered one-shot children watch.
struct WatchRegistration {
    session_id: u64,
    tx: oneshot::Sender<WatchedEvent>,
}

/// The node tree and pending watches.
struct Tree {
    nodes: BTreeMap<String, Node>,
    child_watches: HashMap<String, Vec<WatchRegistration>>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), 0));
        Self {
            nodes,
            child_watches: HashMap::new(),
        }
    }

    fn node(&self, path: &str) -> Result<&Node, StoreError> {
        self.nodes.get(path).ok_or_else(|| StoreError::NoNode { path: path.to_string() })
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut Node, StoreError> {
        self.nodes.get_mut(path).ok_or_else(|| StoreError::NoNode { path: path.to_string() })
    }

    fn create(&mut self, path: &str, data: Vec<u8>, mode: CreateMode, session_id: u64) -> Result<String, StoreError> {
        path::validate(path)?;
        let parent_path = path::parent(path).ok_or_else(|| StoreError::NodeExists { path: path.to_string() })?;

        let parent = self.node_mut(parent_path)?;
        if parent.ephemeral_owner != 0 {
            return Err(StoreError::Failed {
                reason: format!("ephemeral node '{}' cannot have children", parent_path),
            });
        }

        let actual = if mode.is_sequential() {
            let sequence = parent.next_sequence;
            parent.next_sequence = parent.next_sequence.saturating_add(1);
            format!("{}{:010}", path, sequence)
        } else {
            path.to_string()
        };

        if self.nodes.contains_key(&actual) {
            return Err(StoreError::NodeExists { path: actual });
        }

        let owner = if mode.is_ephemeral() { session_id } else { 0 };
        self.nodes.insert(actual.clone(), Node::new(data, owner));
        self.node_mut(parent_path)?.children.insert(path::basename(&actual).to_string());
        self.fire_child_watches(parent_path, WatchEventType::NodeChildrenChanged);

        trace!(path = %actual, ?mode, session_id, "node created");
        Ok(actual)
    }

    fn ensure_path(&mut self, path: &str) -> Result<(), StoreError> {
        path::validate(path)?;
        for ancestor in path::ancestors_inclusive(path) {
            if self.nodes.contains_key(&ancestor) {
                continue;
            }
            self.create(&ancestor, Vec::new(), CreateMode::Persistent, 0)?;
        }
        Ok(())
    }

    fn remove(&mut self, path: &str, expected_version: Option<i32>) -> Result<(), StoreError> {
        path::validate(path)?;
        let node = self.node(path)?;
        if let Some(expected) = expected_version
            && expected != node.version
        {
            return Err(StoreError::BadVersion {
                path: path.to_string(),
                expected,
                actual: node.version,
            });
        }
        if !node.children.is_empty() {
            return Err(StoreError::NotEmpty { path: path.to_string() });
        }
        let Some(parent_path) = path::parent(path) else {
            return Err(StoreError::Failed {
                reason: "cannot remove the root node".to_string(),
            });
        };

        self.nodes.remove(path);
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.remove(path::basename(path));
        }
        self.fire_child_watches(path, WatchEventType::NodeDeleted);
        self.fire_child_watches(parent_path, WatchEventType::NodeChildrenChanged);

        trace!(path, "node removed");
        Ok(())
    }

    fn fire_child_watches(&mut self, path: &str, event_type: WatchEventType) {
        let Some(registrations) = self.child_watches.remove(path) else {
            return;
        };
        for registration in registrations {
            // The receiver may have been dropped; nothing to deliver then.
            let _ = registration.tx.send(WatchedEvent {
                event_type,
                path: path.to_string(),
            });
        }
    }

    fn expire_session(&mut self, session_id: u64) {
        // Reverse order visits children before their parents.
        let owned: Vec<String> = self
            .nodes
            .iter()
            .rev()
            .filter(|(_, node)| node.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            if let Err(e) = self.remove(&path, None) {
                debug!(path, error = %e, "failed to expire ephemeral node");
            }
        }

        for (path, registrations) in self.child_watches.iter_mut() {
            let (closed, kept): (Vec<_>, Vec<_>) =
                registrations.drain(..).partition(|registration| registration.session_id == session_id);
            *registrations = kept;
            for registration in closed {
                let _ = registration.tx.send(WatchedEvent {
                    event_type: WatchEventType::SessionClosed,
                    path: path.clone(),
                });
            }
        }
        self.child_watches.retain(|_, registrations| !registrations.is_empty());
    }
}

/// A held lock.
struct LockHolder {
    transaction_id: String,
    depth: u32,
    session_id: u64,
}

/// Shared state for a set of in-memory sessions.
pub struct InMemoryEnsemble {
    tree: Mutex<Tree>,
    locks: Mutex<HashMap<String, LockHolder>>,
    lock_released: Notify,
    next_session_id: AtomicU64,
}

impl InMemoryEnsemble {
    /// Create an empty ensemble containing only the root node.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tree: Mutex::new(Tree::new()),
            locks: Mutex::new(HashMap::new()),
            lock_released: Notify::new(),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Open a new connected session.
    pub fn connect(self: &Arc<Self>) -> Arc<InMemoryStore> {
        let store = self.connect_detached();
        store.set_connected(true);
        store
    }

    /// Open a new session that is not yet connected.
    pub fn connect_detached(self: &Arc<Self>) -> Arc<InMemoryStore> {
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let (connected, _) = watch::channel(false);
        Arc::new(InMemoryStore {
            ensemble: Arc::clone(self),
            session_id,
            connected,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns true if a node exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.tree.lock().nodes.contains_key(path)
    }

    /// Sorted child names of `path` (empty if it does not exist).
    pub fn children(&self, path: &str) -> Vec<String> {
        self.tree.lock().nodes.get(path).map(|node| node.children.iter().cloned().collect()).unwrap_or_default()
    }

    /// Payload of `path`, if it exists.
    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.lock().nodes.get(path).map(|node| node.data.clone())
    }

    /// Number of children watches registered on `path` and not yet fired.
    pub fn pending_child_watches(&self, path: &str) -> usize {
        self.tree.lock().child_watches.get(path).map_or(0, Vec::len)
    }

    /// Transaction id currently holding the named lock.
    pub fn lock_holder(&self, name: &str) -> Option<String> {
        self.locks.lock().get(name).map(|holder| holder.transaction_id.clone())
    }
}

/// One session against an [`InMemoryEnsemble`].
pub struct InMemoryStore {
    ensemble: Arc<InMemoryEnsemble>,
    session_id: u64,
    connected: watch::Sender<bool>,
    closed: AtomicBool,
}

impl InMemoryStore {
    /// This session's id.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The ensemble this session is attached to.
    pub fn ensemble(&self) -> &Arc<InMemoryEnsemble> {
        &self.ensemble
    }

    /// Simulate the session gaining or losing its connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::SessionClosed {
                session_id: self.session_id,
            });
        }
        Ok(())
    }

    fn check_usable(&self) -> Result<(), StoreError> {
        self.check_open()?;
        if !*self.connected.borrow() {
            return Err(StoreError::ConnectionLoss {
                reason: format!("session {} is disconnected", self.session_id),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn wait_until_connected(&self) -> Result<(), StoreError> {
        self.check_open()?;
        let mut rx = self.connected.subscribe();
        rx.wait_for(|connected| *connected).await.map_err(|_| StoreError::ConnectionLoss {
            reason: "connection state channel closed".to_string(),
        })?;
        Ok(())
    }

    async fn create_recursive(&self, path: &str) -> Result<(), StoreError> {
        self.check_usable()?;
        self.ensemble.tree.lock().ensure_path(path)
    }

    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String, StoreError> {
        self.check_usable()?;
        self.ensemble.tree.lock().create(path, data, mode, self.session_id)
    }

    async fn exists(&self, path: &str) -> Result<Option<Stat>, StoreError> {
        self.check_usable()?;
        path::validate(path)?;
        Ok(self.ensemble.tree.lock().nodes.get(path).map(Node::stat))
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.check_usable()?;
        path::validate(path)?;
        let tree = self.ensemble.tree.lock();
        Ok(tree.node(path)?.children.iter().cloned().collect())
    }

    async fn get_children_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch), StoreError> {
        self.check_usable()?;
        path::validate(path)?;
        let mut tree = self.ensemble.tree.lock();
        let children: Vec<String> = tree.node(path)?.children.iter().cloned().collect();
        let (tx, rx) = oneshot::channel();
        let registrations = tree.child_watches.entry(path.to_string()).or_default();
        // Drop registrations whose ChildWatch was dropped before firing.
        registrations.retain(|registration| !registration.tx.is_closed());
        registrations.push(WatchRegistration {
            session_id: self.session_id,
            tx,
        });
        Ok((children, ChildWatch::new(path, rx)))
    }

    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat), StoreError> {
        self.check_usable()?;
        path::validate(path)?;
        let tree = self.ensemble.tree.lock();
        let node = tree.node(path)?;
        Ok((node.data.clone(), node.stat()))
    }

    async fn set_data(&self, path: &str, data: Vec<u8>, expected_version: Option<i32>) -> Result<Stat, StoreError> {
        self.check_usable()?;
        path::validate(path)?;
        let mut tree = self.ensemble.tree.lock();
        let node = tree.node_mut(path)?;
        if let Some(expected) = expected_version
            && expected != node.version
        {
            return Err(StoreError::BadVersion {
                path: path.to_string(),
                expected,
                actual: node.version,
            });
        }
        node.data = data;
        node.version = node.version.wrapping_add(1);
        Ok(node.stat())
    }

    async fn remove(&self, path: &str, expected_version: Option<i32>) -> Result<(), StoreError> {
        self.check_usable()?;
        self.ensemble.tree.lock().remove(path, expected_version)
    }

    async fn lock(&self, name: &str, transaction_id: &str) -> Result<(), StoreError> {
        self.check_usable()?;
        // The lock node must exist before the lock is held; a failed create
        // leaves nothing to release.
        if path::validate(name).is_ok() {
            self.ensemble.tree.lock().ensure_path(name)?;
        }
        loop {
            // Register interest before inspecting the table so a release
            // between the check and the await is not missed.
            let released = self.ensemble.lock_released.notified();
            {
                let mut locks = self.ensemble.locks.lock();
                match locks.entry(name.to_string()) {
                    Entry::Vacant(slot) => {
                        slot.insert(LockHolder {
                            transaction_id: transaction_id.to_string(),
                            depth: 1,
                            session_id: self.session_id,
                        });
                        break;
                    }
                    Entry::Occupied(mut held) if held.get().transaction_id == transaction_id => {
                        let holder = held.get_mut();
                        holder.depth = holder.depth.saturating_add(1);
                        break;
                    }
                    Entry::Occupied(_) => {}
                }
            }
            released.await;
            self.check_usable()?;
        }

        trace!(name, transaction_id, session_id = self.session_id, "lock acquired");
        Ok(())
    }

    async fn unlock(&self, name: &str) -> Result<(), StoreError> {
        self.check_open()?;
        let released = {
            let mut locks = self.ensemble.locks.lock();
            let Some(holder) = locks.get_mut(name) else {
                return Err(StoreError::LockFailed {
                    name: name.to_string(),
                    reason: "lock is not held".to_string(),
                });
            };
            holder.depth = holder.depth.saturating_sub(1);
            let released = holder.depth == 0;
            if released {
                locks.remove(name);
            }
            released
        };
        if released {
            self.ensemble.lock_released.notify_waiters();
        }
        trace!(name, released, "lock released");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connected.send_replace(false);
        self.ensemble.tree.lock().expire_session(self.session_id);
        self.ensemble.locks.lock().retain(|_, holder| holder.session_id != self.session_id);
        self.ensemble.lock_released.notify_waiters();
        debug!(session_id = self.session_id, "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn create_requires_parent() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();

        let err = store.create("/a/b", Vec::new(), CreateMode::Persistent).await.unwrap_err();
        assert_eq!(err, StoreError::NoNode { path: "/a".to_string() });

        store.create_recursive("/a").await.unwrap();
        let path = store.create("/a/b", b"x".to_vec(), CreateMode::Persistent).await.unwrap();
        assert_eq!(path, "/a/b");
        assert_eq!(ensemble.data("/a/b"), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn duplicate_create_reports_node_exists() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.create_recursive("/a").await.unwrap();
        let err = store.create("/a", Vec::new(), CreateMode::Persistent).await.unwrap_err();
        assert!(err.is_node_exists());
    }

    #[tokio::test]
    async fn sequential_suffixes_are_padded_and_increasing() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.create_recursive("/q").await.unwrap();

        let first = store.create("/q/item-", Vec::new(), CreateMode::EphemeralSequential).await.unwrap();
        let second = store.create("/q/item-", Vec::new(), CreateMode::EphemeralSequential).await.unwrap();

        assert_eq!(first, "/q/item-0000000000");
        assert_eq!(second, "/q/item-0000000001");
    }

    #[tokio::test]
    async fn ephemeral_nodes_die_with_their_session() {
        let ensemble = InMemoryEnsemble::new();
        let owner = ensemble.connect();
        let observer = ensemble.connect();
        owner.create_recursive("/g").await.unwrap();
        let path = owner.create("/g/member", Vec::new(), CreateMode::Ephemeral).await.unwrap();

        let (children, watch) = observer.get_children_watch("/g").await.unwrap();
        assert_eq!(children, vec!["member".to_string()]);

        owner.close().await.unwrap();
        assert!(!ensemble.contains(&path));
        assert!(ensemble.contains("/g"));

        let event = watch.fired().await;
        assert_eq!(event.event_type, WatchEventType::NodeChildrenChanged);
        assert_eq!(event.path, "/g");
    }

    #[tokio::test]
    async fn watches_fire_once() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.create_recursive("/w").await.unwrap();

        let (_, watch) = store.get_children_watch("/w").await.unwrap();
        store.create("/w/a", Vec::new(), CreateMode::Persistent).await.unwrap();
        store.create("/w/b", Vec::new(), CreateMode::Persistent).await.unwrap();

        let event = watch.fired().await;
        assert_eq!(event.event_type, WatchEventType::NodeChildrenChanged);

        // The registration was consumed by the first change.
        let tree = ensemble.tree.lock();
        assert!(!tree.child_watches.contains_key("/w"));
    }

    #[tokio::test]
    async fn remove_checks_version_when_given() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.create_recursive("/v").await.unwrap();
        store.set_data("/v", b"1".to_vec(), None).await.unwrap();

        let err = store.remove("/v", Some(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::BadVersion { expected: 0, actual: 1, .. }));

        store.remove("/v", None).await.unwrap();
        assert!(store.remove("/v", None).await.unwrap_err().is_no_node());
    }

    #[tokio::test]
    async fn disconnected_session_rejects_operations() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect_detached();

        let err = store.exists("/").await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionLoss { .. }));

        let waited = tokio::time::timeout(Duration::from_millis(20), store.wait_until_connected()).await;
        assert!(waited.is_err());

        store.set_connected(true);
        store.wait_until_connected().await.unwrap();
        assert!(store.exists("/").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lock_is_reentrant_per_transaction() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();

        store.lock("/locks/a", "txn-1").await.unwrap();
        store.lock("/locks/a", "txn-1").await.unwrap();
        assert_eq!(ensemble.lock_holder("/locks/a"), Some("txn-1".to_string()));
        assert!(ensemble.contains("/locks/a"));

        store.unlock("/locks/a").await.unwrap();
        assert!(ensemble.lock_holder("/locks/a").is_some());
        store.unlock("/locks/a").await.unwrap();
        assert!(ensemble.lock_holder("/locks/a").is_none());

        let err = store.unlock("/locks/a").await.unwrap_err();
        assert!(matches!(err, StoreError::LockFailed { .. }));
    }

    #[tokio::test]
    async fn failed_lock_node_creation_leaves_lock_free() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.create_recursive("/locks").await.unwrap();
        store.create("/locks/x", Vec::new(), CreateMode::Ephemeral).await.unwrap();

        let err = store.lock("/locks/x/y", "txn-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Failed { .. }));
        assert_eq!(ensemble.lock_holder("/locks/x/y"), None);

        // Another transaction is not blocked by the failed attempt.
        store.remove("/locks/x", None).await.unwrap();
        tokio::time::timeout(Duration::from_millis(200), store.lock("/locks/x/y", "txn-2"))
            .await
            .expect("lock not leaked")
            .unwrap();
        assert_eq!(ensemble.lock_holder("/locks/x/y"), Some("txn-2".to_string()));
    }

    #[tokio::test]
    async fn lock_blocks_other_transactions_until_released() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.lock("/locks/b", "txn-1").await.unwrap();

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lock("/locks/b", "txn-2").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        store.unlock("/locks/b").await.unwrap();
        contender.await.unwrap().unwrap();
        assert_eq!(ensemble.lock_holder("/locks/b"), Some("txn-2".to_string()));
    }

    #[tokio::test]
    async fn closing_a_session_releases_its_locks() {
        let ensemble = InMemoryEnsemble::new();
        let first = ensemble.connect();
        let second = ensemble.connect();

        first.lock("/locks/c", "txn-1").await.unwrap();
        first.close().await.unwrap();

        second.lock("/locks/c", "txn-2").await.unwrap();
        assert_eq!(ensemble.lock_holder("/locks/c"), Some("txn-2".to_string()));
        assert!(matches!(first.exists("/").await.unwrap_err(), StoreError::SessionClosed { .. }));
    }

    #[tokio::test]
    async fn dropped_watches_are_pruned_on_registration() {
        let ensemble = InMemoryEnsemble::new();
        let store = ensemble.connect();
        store.create_recursive("/quiet").await.unwrap();

        for _ in 0..10 {
            let (_, watch) = store.get_children_watch("/quiet").await.unwrap();
            drop(watch);
        }
        let (_, live) = store.get_children_watch("/quiet").await.unwrap();
        assert_eq!(ensemble.pending_child_watches("/quiet"), 1);

        store.create("/quiet/a", Vec::new(), CreateMode::Persistent).await.unwrap();
        assert_eq!(live.fired().await.event_type, WatchEventType::NodeChildrenChanged);
        assert_eq!(ensemble.pending_child_watches("/quiet"), 0);
    }
}
