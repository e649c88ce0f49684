use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::{ConfigErrorKind, ReachError, Result};

/// Parse a CIDR block taken from a fetched rule, route or subnet.
///
/// An unparsable block means the snapshot is malformed.
pub fn parse_cidr(cidr: &str) -> Result<IpNet> {
    cidr.trim()
        .parse::<IpNet>()
        .map_err(|_| ReachError::config(ConfigErrorKind::InvalidCidr, cidr))
}

/// Standard CIDR containment test.
///
/// Addresses of the other family never match.
pub fn matches_cidr(rule_cidr: &str, address: IpAddr) -> Result<bool> {
    let network = parse_cidr(rule_cidr)?;
    Ok(network.contains(&address))
}
