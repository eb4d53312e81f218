//! Path layout under a namespace root.
//!
//! ```text
//! /<ns>/<account>/<zone>/connections/<agent>:<guid>:<seq>
//! /<ns>/data/<key>
//! /<ns>/locks/<key>
//! ```

use orca_store::path;

use crate::constants::CONNECTIONS_DIR;
use crate::constants::COUNTER_DATA_DIR;
use crate::constants::COUNTER_LOCKS_DIR;
use crate::error::CoordinationError;
use crate::presence::ZoneId;

/// Namespace root for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: String,
}

impl Namespace {
    /// Namespace rooted at `/<name>`.
    pub fn new(name: &str) -> Self {
        Self {
            root: path::join("/", name),
        }
    }

    /// The root path.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory holding a zone's connection nodes.
    pub fn zone_connections(&self, zone: &ZoneId) -> String {
        let account = path::join(&self.root, &zone.account_key);
        let zone_dir = path::join(&account, &zone.zone_name);
        path::join(&zone_dir, CONNECTIONS_DIR)
    }

    /// Node holding a counter's value.
    pub fn counter_data(&self, key: &str) -> Result<String, CoordinationError> {
        let key = validate_counter_key(key)?;
        Ok(path::join(&path::join(&self.root, COUNTER_DATA_DIR), key))
    }

    /// Lock guarding a counter's mutations.
    pub fn counter_lock(&self, key: &str) -> Result<String, CoordinationError> {
        let key = validate_counter_key(key)?;
        Ok(path::join(&path::join(&self.root, COUNTER_LOCKS_DIR), key))
    }
}

/// Validate a counter key, returning it without leading separators.
///
/// Keys may carry a leading `/`. They must not be empty, end with a
/// separator, or contain empty segments.
pub fn validate_counter_key(key: &str) -> Result<&str, CoordinationError> {
    let reason = if key.ends_with(path::SEPARATOR) {
        Some("must not end with '/'")
    } else if key.trim_start_matches(path::SEPARATOR).is_empty() {
        Some("must not be empty")
    } else if key.trim_start_matches(path::SEPARATOR).contains("//") {
        Some("empty path segment")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoordinationError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(key.trim_start_matches(path::SEPARATOR)),
    }
}
