//! Primary selection among an agent's connections.
//!
//! The primary is the connection with the numerically smallest sequence
//! suffix. Comparing numbers rather than names keeps the order correct once
//! suffixes outgrow their zero padding.

use crate::pure::presence::sequence_suffix;

/// The primary among `connections`, or `None` if none carry a sequence suffix.
///
/// Ties on the sequence number fall back to name order so the result is
/// deterministic.
pub fn select_primary<S: AsRef<str>>(connections: &[S]) -> Option<&str> {
    connections
        .iter()
        .map(as_str)
        .filter_map(|name| sequence_suffix(name).map(|sequence| (sequence, name)))
        .min()
        .map(|(_, name)| name)
}

fn as_str<S: AsRef<str>>(name: &S) -> &str {
    name.as_ref()
}

/// Whether `my_path` is the primary among `connections`.
pub fn is_primary_connection<S: AsRef<str>>(connections: &[S], my_path: &str) -> bool {
    let Some(mine) = sequence_suffix(my_path) else {
        return false;
    };
    match select_primary(connections).and_then(sequence_suffix) {
        Some(primary) => primary == mine,
        None => false,
    }
}
