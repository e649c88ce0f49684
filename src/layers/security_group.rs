use std::net::IpAddr;

use serde_json::{json, Value};
use tracing::debug;

use crate::check::{CheckKind, CheckResult, Metadata};
use crate::error::Result;
use crate::flow::FlowDescriptor;
use crate::matcher::{matches_cidr, protocol_matches, rule_ports_match};
use crate::snapshot::{Endpoint, SecurityGroupPeer, SecurityGroupRule, TopologySnapshot};
use crate::types::Direction;

fn describe_rule(rule: &SecurityGroupRule) -> Value {
    json!({
        "group_id": rule.group_id,
        "direction": rule.direction.to_string(),
        "protocol": rule.protocol.as_str(),
        "port_range": rule.port_range.map(|r| r.to_string()),
        "peer": rule.peer.to_string(),
    })
}

/// Find the first rule of `rules` in `direction` admitting the flow from or
/// to `peer`.
///
/// Security groups have no deny and no ordering, so any single match is
/// enough. Group references are honoured only for private addressing.
fn find_permission<'a>(
    rules: &'a [SecurityGroupRule],
    direction: Direction,
    flow: &FlowDescriptor,
    peer: &Endpoint,
    peer_addresses: &[IpAddr],
    ignored_references: &mut Vec<Value>,
) -> Result<Option<&'a SecurityGroupRule>> {
    let ports = flow.destination_ports();

    for rule in rules {
        if rule.direction != direction || !protocol_matches(rule.protocol, flow.protocol) {
            continue;
        }
        if !rule_ports_match(rule.protocol, rule.port_range.as_ref(), &ports) {
            continue;
        }
        match &rule.peer {
            SecurityGroupPeer::Cidr(cidr) => {
                for address in peer_addresses {
                    if matches_cidr(cidr, *address)? {
                        return Ok(Some(rule));
                    }
                }
            }
            SecurityGroupPeer::Group(group_id) => {
                if !peer.is_member_of(group_id) {
                    continue;
                }
                if flow.is_public() {
                    ignored_references.push(describe_rule(rule));
                    continue;
                }
                return Ok(Some(rule));
            }
        }
    }
    Ok(None)
}

fn into_result(
    kind: CheckKind,
    label: String,
    matched: Option<&SecurityGroupRule>,
    ignored_references: Vec<Value>,
) -> CheckResult {
    let mut metadata = Metadata::new();
    if let Some(rule) = matched {
        metadata.insert("matched_security_group_rule".into(), describe_rule(rule));
    }
    if !ignored_references.is_empty() {
        metadata.insert(
            "ignored_group_references".into(),
            Value::Array(ignored_references),
        );
    }
    CheckResult::new(kind, label, matched.is_some(), metadata)
}

/// Egress at the source: may the source's groups send the flow to the
/// destination address (or to a member of the destination's groups)?
pub fn evaluate_egress(
    source: &TopologySnapshot,
    destination: &Endpoint,
    destination_address: IpAddr,
    flow: &FlowDescriptor,
) -> Result<CheckResult> {
    let mut ignored = Vec::new();
    let matched = find_permission(
        &source.security_group_rules,
        Direction::Egress,
        flow,
        destination,
        &[destination_address],
        &mut ignored,
    )?;

    debug!(
        source = %source.endpoint.id,
        destination = %destination_address,
        passed = matched.is_some(),
        "security group egress check"
    );

    Ok(into_result(
        CheckKind::SourceSecurityGroupEgress,
        "Security Group at Source allows Egress Traffic".to_string(),
        matched,
        ignored,
    ))
}

/// Ingress at the destination: may the destination's groups accept the flow
/// from any of the source's addresses (or from the source's groups)?
pub fn evaluate_ingress(
    destination: &TopologySnapshot,
    source: &Endpoint,
    source_addresses: &[IpAddr],
    flow: &FlowDescriptor,
) -> Result<CheckResult> {
    let mut ignored = Vec::new();
    let matched = find_permission(
        &destination.security_group_rules,
        Direction::Ingress,
        flow,
        source,
        source_addresses,
        &mut ignored,
    )?;

    let label = if source_addresses.is_empty() {
        "Security Group at Destination allows Ingress traffic from source".to_string()
    } else {
        let addresses: Vec<String> = source_addresses.iter().map(|a| a.to_string()).collect();
        format!(
            "Security Group at Destination allows Ingress traffic from {}",
            addresses.join(", ")
        )
    };

    debug!(
        destination = %destination.endpoint.id,
        source = %source.id,
        passed = matched.is_some(),
        "security group ingress check"
    );

    Ok(into_result(
        CheckKind::DestinationSecurityGroupIngress,
        label,
        matched,
        ignored,
    ))
}
