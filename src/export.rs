//! Terraform rendering of network ACL rules.
//!
//! Two shapes are produced: inline `ingress {}` / `egress {}` blocks for an
//! existing ACL's entries, and standalone `aws_network_acl_rule` resources
//! generated from a declarative rule list for one subnet.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigErrorKind, ReachError, Result};
use crate::matcher::parse_cidr;
use crate::snapshot::{AclEntry, RESERVED_RULE_NUMBER};
use crate::types::{Direction, Protocol};

/// IANA protocol number as the provider writes it; `-1` for all.
fn protocol_code(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "6",
        Protocol::Udp => "17",
        Protocol::Icmp => "1",
        Protocol::All => "-1",
    }
}

fn entry_ports(entry: &AclEntry) -> (u16, u16) {
    entry.port_range.map(|r| (r.from, r.to)).unwrap_or((0, 0))
}

/// Render non-reserved entries as inline Terraform blocks, in input order.
pub fn render_terraform_inline(entries: &[AclEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        if entry.is_reserved() {
            continue;
        }
        let (from, to) = entry_ports(entry);
        let _ = write!(
            out,
            "\n{} {{\n  protocol   = \"{}\"\n  rule_no    = \"{}\"\n  action     = \"{}\"\n  cidr_block = \"{}\"\n  from_port  = \"{}\"\n  to_port    = \"{}\"\n}}\n",
            entry.direction,
            protocol_code(entry.protocol),
            entry.rule_number,
            entry.action,
            entry.cidr,
            from,
            to
        );
    }
    out
}

/// One declared ACL rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaclRuleSpec {
    #[serde(default)]
    pub egress: bool,
    pub rule_no: u32,
    pub rule_action: String,
    pub cidr_block: String,
    pub protocol: String,
    #[serde(default)]
    pub from_port: u16,
    #[serde(default)]
    pub to_port: u16,
}

impl NaclRuleSpec {
    pub fn validate(&self) -> Result<()> {
        if self.rule_action != "allow" && self.rule_action != "deny" {
            return Err(ReachError::config(
                ConfigErrorKind::InvalidRule,
                format!("invalid rule_action '{}' for rule {}", self.rule_action, self.rule_no),
            ));
        }
        if self.rule_no >= RESERVED_RULE_NUMBER {
            return Err(ReachError::config(
                ConfigErrorKind::InvalidRule,
                format!(
                    "rule number {} must be < {} for IPv4 addresses",
                    self.rule_no, RESERVED_RULE_NUMBER
                ),
            ));
        }
        parse_cidr(&self.cidr_block)?;
        Ok(())
    }

    fn direction(&self) -> Direction {
        if self.egress {
            Direction::Egress
        } else {
            Direction::Ingress
        }
    }
}

impl From<&AclEntry> for NaclRuleSpec {
    fn from(entry: &AclEntry) -> Self {
        let (from_port, to_port) = entry_ports(entry);
        Self {
            egress: entry.direction == Direction::Egress,
            rule_no: entry.rule_number,
            rule_action: entry.action.to_string(),
            cidr_block: entry.cidr.clone(),
            protocol: protocol_code(entry.protocol).to_string(),
            from_port,
            to_port,
        }
    }
}

/// Declared rule set for a named subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaclRulesSpec {
    pub subnet_name: String,
    #[serde(default)]
    pub rules: Vec<NaclRuleSpec>,
}

impl NaclRulesSpec {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ReachError::config(ConfigErrorKind::InvalidSnapshot, e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.iter().try_for_each(NaclRuleSpec::validate)
    }

    fn resource_name(&self, rule: &NaclRuleSpec) -> String {
        format!("rule_{}_{}_{}", self.subnet_name, rule.direction(), rule.rule_no)
    }

    fn network_acl_id(&self) -> String {
        format!(
            "${{lookup(local.network_acl_ids_map, \"{}\")}}",
            self.subnet_name
        )
    }
}

/// Validate every rule, then render them as `aws_network_acl_rule`
/// resources. The ACL id is looked up by subnet name at apply time.
pub fn render_terraform_resources(spec: &NaclRulesSpec) -> Result<String> {
    spec.validate()?;

    let mut out = String::from(
        "\n# This is a generated file, do not hand edit. See README at the\n# root of the repository\n\n",
    );
    for rule in &spec.rules {
        let _ = write!(
            out,
            "resource \"aws_network_acl_rule\" \"{}\" {{\n\n    network_acl_id = \"{}\"\n    egress = {}\n    rule_number = {}\n    rule_action = \"{}\"\n    cidr_block = \"{}\"\n    protocol = \"{}\"\n    from_port = {}\n    to_port = {}\n\n}}\n",
            spec.resource_name(rule),
            spec.network_acl_id(),
            rule.egress,
            rule.rule_no,
            rule.rule_action,
            rule.cidr_block,
            rule.protocol,
            rule.from_port,
            rule.to_port
        );
    }

    debug!(subnet = %spec.subnet_name, rules = spec.rules.len(), "rendered network ACL rule resources");
    Ok(out)
}
