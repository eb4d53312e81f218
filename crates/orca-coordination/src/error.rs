//! Error types for coordination primitives.

use orca_store::StoreError;
use snafu::Snafu;

use crate::config::ConfigError;

/// Errors from coordination primitives.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum CoordinationError {
    /// Counter key or node path is malformed. Raised before the store is touched.
    #[snafu(display("invalid key '{key}': {reason}"))]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An argument is outside its accepted range.
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument {
        /// Description of the problem.
        reason: String,
    },

    /// Counter read without a default on a key that was never written.
    #[snafu(display("counter '{key}' not found"))]
    NotFound {
        /// The counter key.
        key: String,
    },

    /// The store connection was not ready in time.
    #[snafu(display("store connection not ready within {timeout_ms}ms"))]
    ConnectionTimeout {
        /// The configured bound.
        timeout_ms: u64,
    },

    /// The barrier cohort did not assemble before the caller's deadline.
    ///
    /// The participant node, if one was registered, is left in place.
    #[snafu(display("barrier '{path}' timed out after {timeout_ms}ms while in stage {stage}"))]
    BarrierTimeout {
        /// The barrier path.
        path: String,
        /// The caller's deadline.
        timeout_ms: u64,
        /// Protocol stage the attempt was in when the deadline fired.
        stage: String,
        /// Participant node registered by this attempt, if any.
        participant_path: Option<String>,
    },

    /// The mutation lock could not be acquired.
    #[snafu(display("failed to acquire lock '{name}': {source}"))]
    LockAcquisition {
        /// The lock path.
        name: String,
        /// The underlying error.
        source: StoreError,
    },

    /// A node that must not exist already does.
    #[snafu(display("node '{path}' already exists"))]
    NodeAlreadyExists {
        /// The conflicting path.
        path: String,
    },

    /// Counter data in the store is not a base-10 integer.
    #[snafu(display("corrupted data in counter '{key}': {reason}"))]
    CorruptedData {
        /// The counter key.
        key: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// Underlying store operation failed.
    #[snafu(display("store error: {source}"))]
    Store {
        /// The underlying error.
        source: StoreError,
    },

    /// Configuration is invalid.
    #[snafu(display("configuration error: {source}"))]
    Config {
        /// The underlying error.
        source: ConfigError,
    },
}

impl From<StoreError> for CoordinationError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::NodeExists { path } => CoordinationError::NodeAlreadyExists { path },
            source => CoordinationError::Store { source },
        }
    }
}

impl From<ConfigError> for CoordinationError {
    fn from(source: ConfigError) -> Self {
        CoordinationError::Config { source }
    }
}
