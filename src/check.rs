use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Matched-rule metadata attached to a check, as a generic key/value map
pub type Metadata = BTreeMap<String, Value>;

/// The eight layer checks of a bidirectional evaluation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Egress ACL at the source, forward leg
    SourceEgressAcl,
    /// Route from the source to the destination
    SourceRoute,
    /// Ingress ACL at the destination, forward leg
    DestinationIngressAcl,
    /// Egress ACL at the destination, return leg
    DestinationEgressAcl,
    /// Route from the destination back to the source
    DestinationRoute,
    /// Ingress ACL at the source, return leg
    SourceIngressAcl,
    /// Security groups of the source permit the flow out
    SourceSecurityGroupEgress,
    /// Security groups of the destination permit the flow in
    DestinationSecurityGroupIngress,
}

impl CheckKind {
    pub const ALL: [CheckKind; 8] = [
        CheckKind::SourceEgressAcl,
        CheckKind::SourceRoute,
        CheckKind::DestinationIngressAcl,
        CheckKind::DestinationEgressAcl,
        CheckKind::DestinationRoute,
        CheckKind::SourceIngressAcl,
        CheckKind::SourceSecurityGroupEgress,
        CheckKind::DestinationSecurityGroupIngress,
    ];

    /// 1-based position in the fixed evaluation order
    pub fn step(&self) -> usize {
        match self {
            CheckKind::SourceEgressAcl => 1,
            CheckKind::SourceRoute => 2,
            CheckKind::DestinationIngressAcl => 3,
            CheckKind::DestinationEgressAcl => 4,
            CheckKind::DestinationRoute => 5,
            CheckKind::SourceIngressAcl => 6,
            CheckKind::SourceSecurityGroupEgress => 7,
            CheckKind::DestinationSecurityGroupIngress => 8,
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::SourceEgressAcl => "source egress ACL",
            CheckKind::SourceRoute => "source route",
            CheckKind::DestinationIngressAcl => "destination ingress ACL",
            CheckKind::DestinationEgressAcl => "destination egress ACL",
            CheckKind::DestinationRoute => "destination route",
            CheckKind::SourceIngressAcl => "source ingress ACL",
            CheckKind::SourceSecurityGroupEgress => "source security group egress",
            CheckKind::DestinationSecurityGroupIngress => "destination security group ingress",
        };
        f.write_str(name)
    }
}

/// Outcome of one layer evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub passed: bool,
    pub label: String,
    pub metadata: Metadata,
}

impl CheckResult {
    pub fn new(kind: CheckKind, label: impl Into<String>, passed: bool, metadata: Metadata) -> Self {
        Self {
            kind,
            passed,
            label: label.into(),
            metadata,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Final verdict over a list of results: every check must pass.
pub fn summarize(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.passed)
}
