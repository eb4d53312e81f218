//! Fixed limits and names used by the coordination primitives.

/// Default bound on waiting for store connectivity (ms).
pub const DEFAULT_TIMEOUT_MS: u64 = 16_000;

/// Default namespace root.
pub const DEFAULT_NAMESPACE: &str = "orca";

/// Directory under a zone holding connection nodes.
pub const CONNECTIONS_DIR: &str = "connections";

/// Directory under the namespace holding counter values.
pub const COUNTER_DATA_DIR: &str = "data";

/// Directory under the namespace holding counter locks.
pub const COUNTER_LOCKS_DIR: &str = "locks";

/// Delimiter between the fields of a connection node name.
pub const CONNECTION_NAME_DELIMITER: char = ':';

/// Child of a barrier path whose existence marks the barrier released.
pub const BARRIER_READY_MARKER: &str = "ready";

/// Buffered events per zone subscription before slow receivers lag.
pub const ZONE_EVENT_CHANNEL_CAPACITY: usize = 64;
