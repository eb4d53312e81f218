//! Scoped hold on a store lock.

use std::sync::Arc;

use orca_store::CoordinationStore;
use tracing::debug;
use tracing::warn;

use crate::error::CoordinationError;

/// A held store lock.
///
/// Release it with [`LockGuard::release`]. If the guard is dropped instead
/// (the owning future was cancelled, or the critical section panicked), the
/// unlock is spawned onto the current runtime.
pub struct LockGuard<S: CoordinationStore + ?Sized + 'static> {
    store: Arc<S>,
    name: String,
    released: bool,
}

impl<S: CoordinationStore + ?Sized + 'static> LockGuard<S> {
    /// Acquire `name` for `transaction_id`.
    pub async fn acquire(store: Arc<S>, name: String, transaction_id: &str) -> Result<Self, CoordinationError> {
        if let Err(source) = store.lock(&name, transaction_id).await {
            return Err(CoordinationError::LockAcquisition { name, source });
        }
        debug!(lock = %name, transaction_id, "lock acquired");
        Ok(Self {
            store,
            name,
            released: false,
        })
    }

    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock.
    pub async fn release(mut self) -> Result<(), CoordinationError> {
        self.released = true;
        self.store.unlock(&self.name).await?;
        debug!(lock = %self.name, "lock released");
        Ok(())
    }
}

impl<S: CoordinationStore + ?Sized + 'static> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(lock = %name, "lock guard dropped while held, releasing in background");
                handle.spawn(async move {
                    if let Err(e) = store.unlock(&name).await {
                        warn!(lock = %name, error = %e, "background lock release failed");
                    }
                });
            }
            Err(_) => warn!(lock = %name, "lock guard dropped outside a runtime, lock not released"),
        }
    }
}
