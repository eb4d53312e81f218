//! Pure functions extracted from the coordination protocols.
//!
//! The async modules do the store I/O; the decisions they make about
//! node names, grouping, ordering and quorum live here so they can be
//! tested with explicit inputs.
//!
//! - [`presence`]: connection node naming and grouping by agent
//! - [`election`]: primary selection by sequence suffix
//! - [`barrier`]: participant counting and release checks

pub mod barrier;
pub mod election;
pub mod presence;

pub use barrier::count_participants;
pub use barrier::has_ready_marker;
pub use barrier::is_quorum_reached;
pub use barrier::participant_prefix;
pub use election::is_primary_connection;
pub use election::select_primary;
pub use presence::ConnectionName;
pub use presence::agent_id_of;
pub use presence::connection_node_prefix;
pub use presence::group_by_agent;
pub use presence::parse_connection_name;
pub use presence::sequence_suffix;
