//! Node, watch, and session types shared by store adapters.

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Deleted when the creating session ends.
    Ephemeral,
    /// Persistent, with a store-assigned sequence suffix.
    PersistentSequential,
    /// Ephemeral, with a store-assigned sequence suffix.
    EphemeralSequential,
}

impl CreateMode {
    /// Returns true if nodes created with this mode are bound to the session.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Returns true if the store appends a sequence suffix to the name.
    pub fn is_sequential(&self) -> bool {
        matches!(self, CreateMode::PersistentSequential | CreateMode::EphemeralSequential)
    }
}

/// Node metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stat {
    /// Data version, incremented by every `set_data`.
    pub version: i32,
    /// Number of direct children.
    pub num_children: u32,
    /// Owning session for ephemeral nodes, 0 otherwise.
    pub ephemeral_owner: u64,
}

/// Kind of change a watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchEventType {
    /// A child was added or removed.
    NodeChildrenChanged,
    /// The watched node itself was deleted.
    NodeDeleted,
    /// The session that registered the watch ended before it fired.
    SessionClosed,
}

/// A fired watch notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEvent {
    /// What happened.
    pub event_type: WatchEventType,
    /// The watched path.
    pub path: String,
}

/// A one-shot children watch.
///
/// Resolves exactly once. To observe further changes the caller must
/// register a new watch.
#[derive(Debug)]
pub struct ChildWatch {
    path: String,
    rx: oneshot::Receiver<WatchedEvent>,
}

impl ChildWatch {
    /// Create a watch resolved through `rx`.
    pub fn new(path: impl Into<String>, rx: oneshot::Receiver<WatchedEvent>) -> Self {
        Self { path: path.into(), rx }
    }

    /// The watched path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the watch to fire.
    ///
    /// If the adapter drops the registration without firing it, this
    /// reports `SessionClosed`.
    pub async fn fired(self) -> WatchedEvent {
        match self.rx.await {
            Ok(event) => event,
            Err(_) => WatchedEvent {
                event_type: WatchEventType::SessionClosed,
                path: self.path,
            },
        }
    }
}
