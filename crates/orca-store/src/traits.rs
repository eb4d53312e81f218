//! The store adapter seam consumed by the coordination primitives.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::ChildWatch;
use crate::types::CreateMode;
use crate::types::Stat;

/// Hierarchical, session-based, watch-capable coordination store.
///
/// Implementations own session lifecycle and reconnection. The coordination
/// primitives only rely on the operations below.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Resolve once the session is connected and usable.
    ///
    /// Callers bound this with their own timeout.
    async fn wait_until_connected(&self) -> Result<(), StoreError>;

    /// Create `path` and any missing ancestors as persistent nodes.
    ///
    /// Nodes that already exist are left untouched.
    async fn create_recursive(&self, path: &str) -> Result<(), StoreError>;

    /// Create a node, returning the actual path (including any sequence suffix).
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String, StoreError>;

    /// Node metadata, or `None` if the node does not exist.
    async fn exists(&self, path: &str) -> Result<Option<Stat>, StoreError>;

    /// Names of the direct children of `path`.
    async fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Names of the direct children of `path`, plus a one-shot watch on them.
    async fn get_children_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch), StoreError>;

    /// Node payload and metadata.
    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat), StoreError>;

    /// Replace the node payload. `None` skips the version check.
    async fn set_data(&self, path: &str, data: Vec<u8>, expected_version: Option<i32>) -> Result<Stat, StoreError>;

    /// Delete a node. `None` skips the version check.
    async fn remove(&self, path: &str, expected_version: Option<i32>) -> Result<(), StoreError>;

    /// Acquire the named lock on behalf of `transaction_id`.
    ///
    /// Reentrant for the same transaction id.
    async fn lock(&self, name: &str, transaction_id: &str) -> Result<(), StoreError>;

    /// Release one hold on the named lock.
    async fn unlock(&self, name: &str) -> Result<(), StoreError>;

    /// End the session. Ephemeral nodes owned by it are removed.
    async fn close(&self) -> Result<(), StoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: CoordinationStore + ?Sized> CoordinationStore for std::sync::Arc<T> {
    async fn wait_until_connected(&self) -> Result<(), StoreError> {
        (**self).wait_until_connected().await
    }

    async fn create_recursive(&self, path: &str) -> Result<(), StoreError> {
        (**self).create_recursive(path).await
    }

    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String, StoreError> {
        (**self).create(path, data, mode).await
    }

    async fn exists(&self, path: &str) -> Result<Option<Stat>, StoreError> {
        (**self).exists(path).await
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        (**self).get_children(path).await
    }

    async fn get_children_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch), StoreError> {
        (**self).get_children_watch(path).await
    }

    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat), StoreError> {
        (**self).get_data(path).await
    }

    async fn set_data(&self, path: &str, data: Vec<u8>, expected_version: Option<i32>) -> Result<Stat, StoreError> {
        (**self).set_data(path, data, expected_version).await
    }

    async fn remove(&self, path: &str, expected_version: Option<i32>) -> Result<(), StoreError> {
        (**self).remove(path, expected_version).await
    }

    async fn lock(&self, name: &str, transaction_id: &str) -> Result<(), StoreError> {
        (**self).lock(name, transaction_id).await
    }

    async fn unlock(&self, name: &str) -> Result<(), StoreError> {
        (**self).unlock(name).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }
}
