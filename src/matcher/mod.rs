//! Rule matcher module.
//!
//! Pure predicates testing whether a single ACL entry or security-group
//! rule applies to a (protocol, port, peer address) tuple.

mod ip;

pub use ip::{matches_cidr, parse_cidr};

use crate::types::{PortRange, Protocol};

/// Check if a rule protocol applies to the queried protocol.
///
/// Numeric codes are normalized when the snapshot is decoded, so this only
/// compares symbolic protocols.
pub fn protocol_matches(rule_protocol: Protocol, query_protocol: Protocol) -> bool {
    rule_protocol.matches(query_protocol)
}

/// Check a single port against a rule's port range.
///
/// A rule without a port range (protocol `all`) matches every port.
pub fn port_in_range(query_port: u16, range: Option<&PortRange>) -> bool {
    match range {
        None => true,
        Some(range) => range.contains(query_port),
    }
}

/// Check that every port of `query` is permitted by a rule's port range.
pub fn range_in_range(query: &PortRange, range: Option<&PortRange>) -> bool {
    match range {
        None => true,
        Some(range) => range.covers(query),
    }
}

/// Port test applied by the layer evaluators.
///
/// Rules for protocol `all` skip the port comparison even when the
/// provider reports a range for them.
pub(crate) fn rule_ports_match(
    rule_protocol: Protocol,
    rule_range: Option<&PortRange>,
    query: &PortRange,
) -> bool {
    rule_protocol == Protocol::All || range_in_range(query, rule_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_in_range_without_range_always_matches() {
        for port in [0u16, 1, 22, 5985, 32768, u16::MAX] {
            assert!(port_in_range(port, None));
        }
    }

    #[test]
    fn test_port_in_range_bounds() {
        let range = PortRange::new(1024, 2048);
        assert!(port_in_range(1024, Some(&range)));
        assert!(port_in_range(2048, Some(&range)));
        assert!(!port_in_range(1023, Some(&range)));
        assert!(!port_in_range(2049, Some(&range)));
    }

    #[test]
    fn test_range_in_range_requires_full_cover() {
        let rule = PortRange::new(32768, 60000);
        assert!(!range_in_range(&PortRange::default_ephemeral(), Some(&rule)));
        assert!(range_in_range(&PortRange::new(40000, 50000), Some(&rule)));
        assert!(range_in_range(&PortRange::default_ephemeral(), None));
    }

    #[test]
    fn test_rule_ports_match_all_protocol_ignores_range() {
        let narrow = PortRange::single(22);
        assert!(rule_ports_match(
            Protocol::All,
            Some(&narrow),
            &PortRange::single(5985)
        ));
        assert!(!rule_ports_match(
            Protocol::Tcp,
            Some(&narrow),
            &PortRange::single(5985)
        ));
    }

    #[test]
    fn test_protocol_matches() {
        assert!(protocol_matches(Protocol::All, Protocol::Udp));
        assert!(protocol_matches(Protocol::Tcp, Protocol::Tcp));
        assert!(!protocol_matches(Protocol::Icmp, Protocol::Tcp));
    }
}
