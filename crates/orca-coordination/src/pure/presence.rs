//! Connection node naming.
//!
//! A connection node is named `<agent_id>:<connection_guid>:<sequence>`,
//! where the store appends the sequence suffix to the prefix
//! `<agent_id>:<connection_guid>:`.

use std::collections::BTreeMap;

use orca_store::path;

use crate::constants::CONNECTION_NAME_DELIMITER;

/// Fields encoded in a connection node name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionName<'a> {
    /// Logical agent owning the connection.
    pub agent_id: &'a str,
    /// Identifier of one physical connection.
    pub connection_guid: &'a str,
    /// Store-assigned sequence number.
    pub sequence: u64,
}

/// Name prefix handed to the store when creating a connection node.
#[inline]
pub fn connection_node_prefix(agent_id: &str, connection_guid: &str) -> String {
    format!("{agent_id}{CONNECTION_NAME_DELIMITER}{connection_guid}{CONNECTION_NAME_DELIMITER}")
}

/// Parse a connection node name (or full path).
///
/// Returns `None` unless the name has an agent id, a guid and a numeric suffix.
pub fn parse_connection_name(name: &str) -> Option<ConnectionName<'_>> {
    let name = path::basename(name);
    let (agent_id, rest) = name.split_once(CONNECTION_NAME_DELIMITER)?;
    let (connection_guid, suffix) = rest.rsplit_once(CONNECTION_NAME_DELIMITER)?;
    let sequence = parse_suffix(suffix)?;
    Some(ConnectionName {
        agent_id,
        connection_guid,
        sequence,
    })
}

/// Agent id of a connection node name: the text before the first delimiter.
#[inline]
pub fn agent_id_of(name: &str) -> &str {
    match name.split_once(CONNECTION_NAME_DELIMITER) {
        Some((agent_id, _)) => agent_id,
        None => name,
    }
}

/// Numeric sequence suffix of a connection node name or path.
pub fn sequence_suffix(name: &str) -> Option<u64> {
    let name = path::basename(name);
    let (_, suffix) = name.rsplit_once(CONNECTION_NAME_DELIMITER)?;
    parse_suffix(suffix)
}

fn parse_suffix(suffix: &str) -> Option<u64> {
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Group connection node names by agent id, oldest connection first.
///
/// Store listings sort by name, which orders by guid rather than by age.
/// Each group is sorted by sequence suffix, with the name as tiebreak and
/// unsuffixed names last.
pub fn group_by_agent<I>(names: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = String>,
{
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        groups.entry(agent_id_of(&name).to_string()).or_default().push(name);
    }
    for connections in groups.values_mut() {
        connections.sort_by_cached_key(|name| (sequence_suffix(name).unwrap_or(u64::MAX), name.clone()));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_parsed_fields() {
        let prefix = connection_node_prefix("agentId1", "c0ffee");
        let name = format!("{prefix}0000000007");
        let parsed = parse_connection_name(&name).unwrap();
        assert_eq!(parsed.agent_id, "agentId1");
        assert_eq!(parsed.connection_guid, "c0ffee");
        assert_eq!(parsed.sequence, 7);
    }

    #[test]
    fn parse_accepts_full_paths() {
        let parsed = parse_connection_name("/ns/ac/zone/connections/a:g:0000000012").unwrap();
        assert_eq!(parsed.sequence, 12);
        assert_eq!(sequence_suffix("/ns/ac/zone/connections/a:g:0000000012"), Some(12));
    }

    #[test]
    fn guid_may_contain_delimiters() {
        let parsed = parse_connection_name("a:g:h:0000000003").unwrap();
        assert_eq!(parsed.agent_id, "a");
        assert_eq!(parsed.connection_guid, "g:h");
        assert_eq!(parsed.sequence, 3);
    }

    #[test]
    fn malformed_names_do_not_parse() {
        assert!(parse_connection_name("agent").is_none());
        assert!(parse_connection_name("agent:0000000001").is_none());
        assert!(parse_connection_name("agent:guid:").is_none());
        assert!(parse_connection_name("agent:guid:-1").is_none());
        assert_eq!(sequence_suffix("agent"), None);
    }

    #[test]
    fn agent_id_is_text_before_first_delimiter() {
        assert_eq!(agent_id_of("a:b:1"), "a");
        assert_eq!(agent_id_of("plain"), "plain");
    }

    #[test]
    fn grouping_orders_by_sequence_not_guid() {
        let groups = group_by_agent(vec![
            "agent:aaa:0000000001".to_string(),
            "agent:mmm:0000000010".to_string(),
            "agent:zzz:0000000000".to_string(),
            "agent:bad:".to_string(),
        ]);
        assert_eq!(groups["agent"], vec![
            "agent:zzz:0000000000",
            "agent:aaa:0000000001",
            "agent:mmm:0000000010",
            "agent:bad:"
        ]);
    }

    #[test]
    fn grouping_keeps_order_within_agent() {
        let groups = group_by_agent(vec![
            "b:x:0000000001".to_string(),
            "a:y:0000000002".to_string(),
            "b:z:0000000003".to_string(),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a"], vec!["a:y:0000000002"]);
        assert_eq!(groups["b"], vec!["b:x:0000000001", "b:z:0000000003"]);
    }
}
