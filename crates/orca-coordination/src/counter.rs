//! Lock-protected distributed counters.
//!
//! A counter lives at `/<ns>/data/<key>` as a base-10 integer. Mutations are
//! serialized through the store lock at `/<ns>/locks/<key>` and written
//! without a version check: the lock, not the node version, is what rules
//! out lost updates. Counters are created lazily on first use and never
//! deleted.

use std::sync::Arc;
use std::time::Duration;

use orca_store::CoordinationStore;
use orca_store::CreateMode;
use orca_store::StoreError;
use orca_store::path;
use tracing::debug;
use tracing::warn;

use crate::connection::wait_for_connection;
use crate::error::CoordinationError;
use crate::lock::LockGuard;
use crate::paths::Namespace;

/// Distributed integer counters keyed by name.
pub struct AtomicCounter<S: CoordinationStore + ?Sized + 'static> {
    store: Arc<S>,
    namespace: Namespace,
    timeout: Duration,
}

impl<S: CoordinationStore + ?Sized + 'static> AtomicCounter<S> {
    /// Create a counter handle.
    ///
    /// `timeout` bounds the wait for store connectivity, not the duration of
    /// the read-modify-write itself.
    pub fn new(store: Arc<S>, namespace: Namespace, timeout: Duration) -> Self {
        Self {
            store,
            namespace,
            timeout,
        }
    }

    /// Read a counter that must already exist.
    pub async fn get(&self, key: &str) -> Result<i64, CoordinationError> {
        let data_path = self.namespace.counter_data(key)?;
        wait_for_connection(&*self.store, self.timeout).await?;

        self.read_value(&data_path, key).await?.ok_or_else(|| CoordinationError::NotFound { key: key.to_string() })
    }

    /// Read a counter, initializing it to `default_value` if absent.
    ///
    /// Initialization does not take the mutation lock. If another caller
    /// creates the node first, its value is returned instead.
    pub async fn get_or_init(&self, key: &str, default_value: i64) -> Result<i64, CoordinationError> {
        let data_path = self.namespace.counter_data(key)?;
        wait_for_connection(&*self.store, self.timeout).await?;

        if let Some(value) = self.read_value(&data_path, key).await? {
            return Ok(value);
        }

        match self.create_value(&data_path, default_value).await {
            Ok(()) => {
                debug!(key, value = default_value, "counter initialized");
                Ok(default_value)
            }
            Err(StoreError::NodeExists { .. }) => {
                Ok(self.read_value(&data_path, key).await?.unwrap_or(default_value))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Add one and return the new value.
    pub async fn increment_and_get(&self, key: &str, transaction_id: &str) -> Result<i64, CoordinationError> {
        self.increment_and_get_by(key, 1, transaction_id).await
    }

    /// Subtract one and return the new value.
    pub async fn decrement_and_get(&self, key: &str, transaction_id: &str) -> Result<i64, CoordinationError> {
        self.increment_and_get_by(key, -1, transaction_id).await
    }

    /// Subtract `amount` and return the new value.
    pub async fn decrement_and_get_by(
        &self,
        key: &str,
        amount: i64,
        transaction_id: &str,
    ) -> Result<i64, CoordinationError> {
        let delta = amount.checked_neg().ok_or_else(|| CoordinationError::InvalidArgument {
            reason: format!("cannot negate decrement amount {amount}"),
        })?;
        self.increment_and_get_by(key, delta, transaction_id).await
    }

    /// Add `delta` under the counter's lock and return the new value.
    ///
    /// A missing counter starts at zero. The lock is released on every
    /// exit path.
    pub async fn increment_and_get_by(
        &self,
        key: &str,
        delta: i64,
        transaction_id: &str,
    ) -> Result<i64, CoordinationError> {
        let data_path = self.namespace.counter_data(key)?;
        let lock_path = self.namespace.counter_lock(key)?;
        wait_for_connection(&*self.store, self.timeout).await?;

        let guard = LockGuard::acquire(Arc::clone(&self.store), lock_path, transaction_id).await?;
        let result = self.apply_delta(&data_path, key, delta).await;
        let released = guard.release().await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(release_error) = released {
                    warn!(key, error = %release_error, "failed to release counter lock after error");
                }
                Err(e)
            }
        }
    }

    /// Read-modify-write; caller holds the lock.
    async fn apply_delta(&self, data_path: &str, key: &str, delta: i64) -> Result<i64, CoordinationError> {
        let current = match self.read_value(data_path, key).await? {
            Some(value) => value,
            None => match self.create_value(data_path, 0).await {
                Ok(()) => 0,
                // Created concurrently by an unlocked get_or_init.
                Err(StoreError::NodeExists { .. }) => self.read_value(data_path, key).await?.unwrap_or(0),
                Err(e) => return Err(e.into()),
            },
        };

        let new_value = current.checked_add(delta).ok_or_else(|| CoordinationError::InvalidArgument {
            reason: format!("counter '{key}' overflows: {current} + {delta}"),
        })?;

        self.store.set_data(data_path, new_value.to_string().into_bytes(), None).await?;
        debug!(key, delta, value = new_value, "counter updated");
        Ok(new_value)
    }

    /// Current value, or `None` if the node does not exist.
    async fn read_value(&self, data_path: &str, key: &str) -> Result<Option<i64>, CoordinationError> {
        match self.store.get_data(data_path).await {
            Ok((data, _)) => parse_counter_value(key, &data).map(Some),
            Err(StoreError::NoNode { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the counter node and its parents.
    async fn create_value(&self, data_path: &str, value: i64) -> Result<(), StoreError> {
        if let Some(parent) = path::parent(data_path) {
            self.store.create_recursive(parent).await?;
        }
        self.store.create(data_path, value.to_string().into_bytes(), CreateMode::Persistent).await?;
        Ok(())
    }
}

fn parse_counter_value(key: &str, data: &[u8]) -> Result<i64, CoordinationError> {
    let text = std::str::from_utf8(data).map_err(|e| CoordinationError::CorruptedData {
        key: key.to_string(),
        reason: format!("not utf-8: {e}"),
    })?;
    text.trim().parse::<i64>().map_err(|e| CoordinationError::CorruptedData {
        key: key.to_string(),
        reason: format!("'{text}' is not an integer: {e}"),
    })
}
