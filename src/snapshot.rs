//! Topology snapshot module.
//!
//! Immutable per-endpoint bundle of subnet, routing, network ACL and
//! security-group facts, as collected by a data-fetching collaborator.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigErrorKind, ReachError, Result};
use crate::matcher::parse_cidr;
use crate::types::{Direction, PortRange, Protocol, RuleAction};

/// Rule numbers from this value upwards are reserved for the provider's
/// default deny-all entries.
pub const RESERVED_RULE_NUMBER: u32 = 32767;

/// A single stateless network ACL entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub rule_number: u32,
    pub direction: Direction,
    pub protocol: Protocol,
    pub cidr: String,
    /// Absent for protocol `all`
    #[serde(default)]
    pub port_range: Option<PortRange>,
    pub action: RuleAction,
}

impl AclEntry {
    /// Provider default entry, never user-editable
    pub fn is_reserved(&self) -> bool {
        self.rule_number >= RESERVED_RULE_NUMBER
    }
}

/// Network ACL associated with a subnet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAcl {
    pub id: String,
    #[serde(default)]
    pub entries: Vec<AclEntry>,
}

/// A subnet an endpoint is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub vpc_id: String,
    pub cidr: String,
    #[serde(default)]
    pub network_acl: NetworkAcl,
}

/// Where a route sends matching traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Local,
    InternetGateway(String),
    NatGateway(String),
    NatInstance {
        instance_id: String,
        #[serde(default)]
        network_interface_id: Option<String>,
    },
    PeeringConnection(String),
    VpcEndpoint(String),
}

impl RouteTarget {
    /// Identifier of the gateway, connection or instance behind the route
    pub fn id(&self) -> &str {
        match self {
            RouteTarget::Local => "local",
            RouteTarget::InternetGateway(id)
            | RouteTarget::NatGateway(id)
            | RouteTarget::PeeringConnection(id)
            | RouteTarget::VpcEndpoint(id) => id,
            RouteTarget::NatInstance { instance_id, .. } => instance_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RouteTarget::Local => "local",
            RouteTarget::InternetGateway(_) => "internet_gateway",
            RouteTarget::NatGateway(_) => "nat_gateway",
            RouteTarget::NatInstance { .. } => "nat_instance",
            RouteTarget::PeeringConnection(_) => "peering_connection",
            RouteTarget::VpcEndpoint(_) => "vpc_endpoint",
        }
    }

    /// A NAT instance route forwards nothing until its interface is known.
    pub fn is_usable(&self) -> bool {
        match self {
            RouteTarget::NatInstance {
                network_interface_id,
                ..
            } => network_interface_id
                .as_deref()
                .is_some_and(|eni| !eni.is_empty()),
            _ => true,
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::NatInstance {
                instance_id,
                network_interface_id: Some(eni),
            } if !eni.is_empty() => write!(f, "{} - {}", instance_id, eni),
            RouteTarget::NatInstance { instance_id, .. } => {
                write!(f, "{} - (No ENI)", instance_id)
            }
            other => f.write_str(other.id()),
        }
    }
}

/// Route destination: a literal CIDR or a managed prefix list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDestination {
    Cidr(String),
    PrefixList(String),
}

impl fmt::Display for RouteDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteDestination::Cidr(cidr) => f.write_str(cidr),
            RouteDestination::PrefixList(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: RouteDestination,
    pub target: RouteTarget,
}

/// Route table of a virtual network.
///
/// A table is either explicitly associated with subnets or is the network's
/// main table, used by every subnet without an explicit association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub id: String,
    pub vpc_id: String,
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// What a security-group rule permits traffic to or from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityGroupPeer {
    Cidr(String),
    /// Reference to another security group by identity
    Group(String),
}

impl fmt::Display for SecurityGroupPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityGroupPeer::Cidr(cidr) => f.write_str(cidr),
            SecurityGroupPeer::Group(id) => f.write_str(id),
        }
    }
}

/// A single flattened security-group permission record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub group_id: String,
    pub direction: Direction,
    pub protocol: Protocol,
    /// Absent for protocol `all`
    #[serde(default)]
    pub port_range: Option<PortRange>,
    pub peer: SecurityGroupPeer,
}

/// One side of a flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    #[serde(default)]
    pub private_addresses: Vec<IpAddr>,
    #[serde(default)]
    pub public_address: Option<IpAddr>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub security_groups: Vec<String>,
}

impl Endpoint {
    pub fn is_member_of(&self, group_id: &str) -> bool {
        self.security_groups.iter().any(|g| g == group_id)
    }
}

/// Everything the evaluator knows about one endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub endpoint: Endpoint,
    /// Route tables of the endpoint's virtual network(s)
    #[serde(default)]
    pub route_tables: Vec<RouteTable>,
    /// Rules of every group the endpoint belongs to
    #[serde(default)]
    pub security_group_rules: Vec<SecurityGroupRule>,
}

impl TopologySnapshot {
    /// Snapshot for an arbitrary address outside any modeled network
    pub fn external(ip: IpAddr) -> Self {
        Self {
            endpoint: Endpoint {
                id: ip.to_string(),
                private_addresses: vec![ip],
                public_address: Some(ip),
                subnets: Vec::new(),
                security_groups: Vec::new(),
            },
            route_tables: Vec::new(),
            security_group_rules: Vec::new(),
        }
    }

    /// Decode a snapshot from its JSON representation.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ReachError::config(ConfigErrorKind::InvalidSnapshot, e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReachError::config(ConfigErrorKind::InvalidSnapshot, e.to_string()))
    }

    pub fn has_subnets(&self) -> bool {
        !self.endpoint.subnets.is_empty()
    }

    /// Resolve the route tables governing `subnet`.
    ///
    /// Explicit associations take precedence; otherwise the single main
    /// table of the subnet's network applies.
    pub fn route_tables_for(&self, subnet: &Subnet) -> Result<Vec<&RouteTable>> {
        let explicit: Vec<&RouteTable> = self
            .route_tables
            .iter()
            .filter(|t| t.subnet_ids.iter().any(|s| s == &subnet.id))
            .collect();
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let main: Vec<&RouteTable> = self
            .route_tables
            .iter()
            .filter(|t| t.main && t.vpc_id == subnet.vpc_id)
            .collect();
        match main.len() {
            0 => Err(ReachError::config(
                ConfigErrorKind::MissingRouteTable,
                format!(
                    "subnet {} has no associated route table and {} has no main table",
                    subnet.id, subnet.vpc_id
                ),
            )),
            1 => Ok(main),
            n => Err(ReachError::config(
                ConfigErrorKind::MultipleMainRouteTables,
                format!("{} has {} main route tables", subnet.vpc_id, n),
            )),
        }
    }

    /// Check every CIDR and route-table association up front.
    ///
    /// A snapshot that passes validation cannot abort an evaluation.
    pub fn validate(&self) -> Result<()> {
        for subnet in &self.endpoint.subnets {
            parse_cidr(&subnet.cidr)?;
            let acl = &subnet.network_acl;
            let mut numbers = HashSet::new();
            for entry in &acl.entries {
                parse_cidr(&entry.cidr)?;
                check_port_range(entry.port_range, || {
                    format!("{} rule {}", acl.id, entry.rule_number)
                })?;
                // Provider defaults repeat the reserved number per address family.
                if !entry.is_reserved() && !numbers.insert((entry.direction, entry.rule_number)) {
                    return Err(ReachError::config(
                        ConfigErrorKind::InvalidRule,
                        format!(
                            "{} has more than one {} rule numbered {}",
                            acl.id, entry.direction, entry.rule_number
                        ),
                    ));
                }
            }
            self.route_tables_for(subnet)?;
        }

        for table in &self.route_tables {
            for route in &table.routes {
                if let RouteDestination::Cidr(cidr) = &route.destination {
                    parse_cidr(cidr)?;
                }
            }
        }

        for rule in &self.security_group_rules {
            if let SecurityGroupPeer::Cidr(cidr) = &rule.peer {
                parse_cidr(cidr)?;
            }
            check_port_range(rule.port_range, || {
                format!("{} {} rule for {}", rule.group_id, rule.direction, rule.peer)
            })?;
        }

        Ok(())
    }
}

fn check_port_range(range: Option<PortRange>, owner: impl FnOnce() -> String) -> Result<()> {
    match range {
        Some(range) if range.from > range.to => Err(ReachError::config(
            ConfigErrorKind::InvalidRule,
            format!("{} has reversed port range {}-{}", owner(), range.from, range.to),
        )),
        _ => Ok(()),
    }
}
