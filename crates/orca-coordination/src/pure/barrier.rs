//! Double barrier decisions.

use orca_store::path;

use crate::constants::BARRIER_READY_MARKER;

/// Number of participant nodes among a barrier's children.
#[inline]
pub fn count_participants<S: AsRef<str>>(children: &[S]) -> u32 {
    let count = children.iter().map(as_str).filter(|child| *child != BARRIER_READY_MARKER).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Whether the ready marker is among a barrier's children.
#[inline]
pub fn has_ready_marker<S: AsRef<str>>(children: &[S]) -> bool {
    children.iter().map(as_str).any(|child| child == BARRIER_READY_MARKER)
}

fn as_str<S: AsRef<str>>(child: &S) -> &str {
    child.as_ref()
}

/// Whether enough participants have arrived to release the barrier.
#[inline]
pub fn is_quorum_reached(participants: u32, client_count: u32) -> bool {
    participants >= client_count
}

/// Name prefix for a participant node; the store appends the sequence suffix.
#[inline]
pub fn participant_prefix(barrier_path: &str, token: &str) -> String {
    path::join(barrier_path, &format!("{token}-"))
}
