use std::cmp::Ordering;
use std::net::IpAddr;

use serde_json::{json, Value};
use tracing::debug;

use crate::check::{CheckKind, CheckResult, Metadata};
use crate::error::Result;
use crate::matcher::{matches_cidr, protocol_matches, rule_ports_match};
use crate::snapshot::{AclEntry, Endpoint, Subnet};
use crate::types::{Direction, PortRange, Protocol, RuleAction};

/// One stateless ACL query against the subnets of an endpoint
#[derive(Debug, Clone, Copy)]
pub struct AclQuery {
    pub peer: IpAddr,
    pub protocol: Protocol,
    pub ports: PortRange,
    pub direction: Direction,
}

/// Evaluation order of two matching entries: lower rule number first.
///
/// Snapshot validation rejects equal rule numbers in one direction; for
/// entries handed in directly, deny is preferred and the remaining fields
/// make the order total, so the selection never depends on input order.
fn evaluation_order(a: &AclEntry, b: &AclEntry) -> Ordering {
    let deny_first = |e: &AclEntry| match e.action {
        RuleAction::Deny => 0u8,
        RuleAction::Allow => 1u8,
    };
    a.rule_number
        .cmp(&b.rule_number)
        .then_with(|| deny_first(a).cmp(&deny_first(b)))
        .then_with(|| a.protocol.as_str().cmp(b.protocol.as_str()))
        .then_with(|| a.cidr.cmp(&b.cidr))
        .then_with(|| a.port_range.cmp(&b.port_range))
}

/// Select the entry deciding the query: the lowest-numbered entry whose
/// direction, protocol and CIDR match.
pub fn select_entry<'a>(entries: &'a [AclEntry], query: &AclQuery) -> Result<Option<&'a AclEntry>> {
    let mut selected: Option<&AclEntry> = None;
    for entry in entries {
        if entry.direction != query.direction || !protocol_matches(entry.protocol, query.protocol) {
            continue;
        }
        if !matches_cidr(&entry.cidr, query.peer)? {
            continue;
        }
        selected = match selected {
            Some(current) if evaluation_order(current, entry) != Ordering::Greater => Some(current),
            _ => Some(entry),
        };
    }
    Ok(selected)
}

/// Decide one subnet's ACL for the query.
pub fn evaluate_subnet(subnet: &Subnet, query: &AclQuery, kind: CheckKind) -> Result<CheckResult> {
    let selected = select_entry(&subnet.network_acl.entries, query)?;

    let mut metadata = Metadata::new();
    metadata.insert("subnet_id".into(), Value::from(subnet.id.as_str()));
    metadata.insert(
        "network_acl_id".into(),
        Value::from(subnet.network_acl.id.as_str()),
    );
    metadata.insert("peer_address".into(), Value::from(query.peer.to_string()));
    metadata.insert("ports".into(), Value::from(query.ports.to_string()));

    let passed = match selected {
        Some(entry) => {
            metadata.insert("matched_rule_number".into(), Value::from(entry.rule_number));
            metadata.insert("matched_action".into(), Value::from(entry.action.to_string()));
            metadata.insert("matched_cidr".into(), Value::from(entry.cidr.as_str()));
            metadata.insert("matched_protocol".into(), Value::from(entry.protocol.as_str()));
            if let Some(range) = entry.port_range {
                metadata.insert(
                    "matched_port_range".into(),
                    json!({ "from": range.from, "to": range.to }),
                );
            }
            entry.action == RuleAction::Allow
                && rule_ports_match(entry.protocol, entry.port_range.as_ref(), &query.ports)
        }
        None => {
            metadata.insert("implicit_deny".into(), Value::from(true));
            false
        }
    };

    let label = match query.direction {
        Direction::Egress => format!("Egress ACL from Subnet {} to {}", subnet.id, query.peer),
        Direction::Ingress => format!("Ingress ACL at Subnet {} from {}", subnet.id, query.peer),
    };

    debug!(
        subnet = %subnet.id,
        direction = %query.direction,
        peer = %query.peer,
        ports = %query.ports,
        rule = selected.map(|e| e.rule_number),
        passed,
        "ACL check"
    );

    Ok(CheckResult::new(kind, label, passed, metadata))
}

/// Evaluate the query against every subnet of `owner`, one result per subnet.
pub fn evaluate_acl(owner: &Endpoint, query: &AclQuery, kind: CheckKind) -> Result<Vec<CheckResult>> {
    owner
        .subnets
        .iter()
        .map(|subnet| evaluate_subnet(subnet, query, kind))
        .collect()
}
