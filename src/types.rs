use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReachError;
use crate::parser::parse_protocol;

/// First port of the default ephemeral range
pub const DEFAULT_EPHEMERAL_FROM: u16 = 32768;
/// Last port of the default ephemeral range
pub const DEFAULT_EPHEMERAL_TO: u16 = 61000;

/// Network protocol of a rule or a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Any protocol (`all` / `-1`)
    All,
}

impl Protocol {
    /// Symbolic name used in reports and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "all",
        }
    }

    /// Check if a rule with this protocol applies to a flow using `query`.
    ///
    /// A rule protocol of `All` matches any query; otherwise the protocols
    /// must be identical.
    pub fn matches(&self, query: Protocol) -> bool {
        match self {
            Protocol::All => true,
            other => *other == query,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ReachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_protocol(s)
    }
}

impl TryFrom<String> for Protocol {
    type Error = ReachError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_protocol(&value)
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.as_str().to_string()
    }
}

/// Traffic direction a filtering rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Egress,
    Ingress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Egress => f.write_str("egress"),
            Direction::Ingress => f.write_str("ingress"),
        }
    }
}

/// Network ACL rule action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Allow => f.write_str("allow"),
            RuleAction::Deny => f.write_str("deny"),
        }
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    pub fn new(from: u16, to: u16) -> Self {
        Self { from, to }
    }

    /// Range holding a single port
    pub fn single(port: u16) -> Self {
        Self {
            from: port,
            to: port,
        }
    }

    /// Default client-side range used for the return leg of stateless checks
    pub fn default_ephemeral() -> Self {
        Self {
            from: DEFAULT_EPHEMERAL_FROM,
            to: DEFAULT_EPHEMERAL_TO,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.from <= port && port <= self.to
    }

    /// True if every port of `other` lies inside this range.
    pub fn covers(&self, other: &PortRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}
