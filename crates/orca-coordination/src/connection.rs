//! Bounded wait for store connectivity.

use std::time::Duration;

use orca_store::CoordinationStore;
use tracing::debug;

use crate::error::CoordinationError;

/// Wait until `store` reports a usable session, failing after `timeout`.
pub(crate) async fn wait_for_connection<S>(store: &S, timeout: Duration) -> Result<(), CoordinationError>
where
    S: CoordinationStore + ?Sized,
{
    match tokio::time::timeout(timeout, store.wait_until_connected()).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            let timeout_ms = timeout.as_millis() as u64;
            debug!(timeout_ms, "store connection not ready in time");
            Err(CoordinationError::ConnectionTimeout { timeout_ms })
        }
    }
}
