//! Error types reported by coordination store adapters.

use snafu::Snafu;

/// Errors returned by a [`CoordinationStore`](crate::CoordinationStore).
///
/// The variants mirror the result codes of a hierarchical coordination
/// service so callers can match on the conditions they tolerate
/// (for example `NodeExists` during an idempotent create).
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The node does not exist.
    #[snafu(display("node '{path}' does not exist"))]
    NoNode {
        /// The missing path.
        path: String,
    },

    /// A node already exists at the path.
    #[snafu(display("node '{path}' already exists"))]
    NodeExists {
        /// The conflicting path.
        path: String,
    },

    /// The expected version did not match the node's version.
    #[snafu(display("version mismatch on '{path}': expected {expected}, actual {actual}"))]
    BadVersion {
        /// The node path.
        path: String,
        /// Version supplied by the caller.
        expected: i32,
        /// Version currently stored.
        actual: i32,
    },

    /// The node has children and cannot be removed.
    #[snafu(display("node '{path}' has children"))]
    NotEmpty {
        /// The node path.
        path: String,
    },

    /// The path is not a valid absolute node path.
    #[snafu(display("invalid path '{path}': {reason}"))]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The session is currently disconnected from the ensemble.
    #[snafu(display("connection lost: {reason}"))]
    ConnectionLoss {
        /// Description of the disconnect.
        reason: String,
    },

    /// The session has been closed and can no longer be used.
    #[snafu(display("session {session_id} is closed"))]
    SessionClosed {
        /// The closed session.
        session_id: u64,
    },

    /// Lock acquisition or release failed.
    #[snafu(display("lock '{name}' failed: {reason}"))]
    LockFailed {
        /// Lock name.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// Any other adapter failure.
    #[snafu(display("store operation failed: {reason}"))]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl StoreError {
    /// Returns true if this error reports an already existing node.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, StoreError::NodeExists { .. })
    }

    /// Returns true if this error reports a missing node.
    pub fn is_no_node(&self) -> bool {
        matches!(self, StoreError::NoNode { .. })
    }
}
