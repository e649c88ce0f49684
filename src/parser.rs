use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ReachError, Result};
use crate::types::{PortRange, Protocol};

/// Regex pattern for port ranges
/// Format: port, from-to or from,to
static PORT_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,5})\s*(?:[-,]\s*(\d{1,5})\s*)?$")
        .expect("PORT_RANGE_PATTERN: hardcoded regex is invalid")
});

/// Normalize a provider protocol value to a `Protocol`.
///
/// Accepts symbolic names (`tcp`, `udp`, `icmp`, `all`) in any case and the
/// numeric codes used by provider APIs (`6`, `17`, `1`, `-1`).
pub fn parse_protocol(value: &str) -> Result<Protocol> {
    match value.trim().to_lowercase().as_str() {
        "tcp" | "6" => Ok(Protocol::Tcp),
        "udp" | "17" => Ok(Protocol::Udp),
        "icmp" | "1" => Ok(Protocol::Icmp),
        "all" | "-1" => Ok(Protocol::All),
        other => Err(ReachError::InvalidProtocol(other.to_string())),
    }
}

/// Parse a port range specification
/// Examples: "5985", "49152,65535", "1024-65535"
pub fn parse_port_range(spec: &str) -> Result<PortRange> {
    let captures = PORT_RANGE_PATTERN
        .captures(spec)
        .ok_or_else(|| ReachError::InvalidPortRange(format!("Invalid format: {}", spec)))?;

    let parse_port = |s: &str| -> Result<u16> {
        s.parse::<u16>()
            .map_err(|_| ReachError::InvalidPortRange(format!("Invalid port: {}", s)))
    };

    let from = match captures.get(1) {
        Some(m) => parse_port(m.as_str())?,
        None => return Err(ReachError::InvalidPortRange(spec.to_string())),
    };
    let to = match captures.get(2) {
        Some(m) => parse_port(m.as_str())?,
        None => from,
    };

    ordered(PortRange::new(from, to))
}

/// Reject a range whose lower bound exceeds its upper bound.
pub(crate) fn ordered(range: PortRange) -> Result<PortRange> {
    if range.from > range.to {
        return Err(ReachError::InvalidPortRange(format!(
            "Invalid port range: {} > {}",
            range.from, range.to
        )));
    }
    Ok(range)
}

/// Parse protocol/port specification
/// Examples: "tcp/5985", "udp/53", "6/8000-9000"
pub fn parse_proto_port(spec: &str) -> Result<(Protocol, PortRange)> {
    let (proto_str, port_spec) = spec
        .trim()
        .split_once('/')
        .ok_or_else(|| ReachError::InvalidPortRange(format!("Invalid format: {}", spec)))?;

    let protocol = parse_protocol(proto_str)?;
    let range = parse_port_range(port_spec)?;
    Ok((protocol, range))
}
