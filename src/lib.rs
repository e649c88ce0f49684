//! Reach Engine - network reachability evaluation for cloud virtual networks
//!
//! Given the topology snapshots of two endpoints and a flow description,
//! this library decides whether the flow can be established, walking every
//! filtering and routing layer in both directions:
//! - Stateless network ACLs (forward and return legs, ephemeral ports)
//! - Route existence from each side to the other
//! - Stateful security groups (egress at source, ingress at destination)
//!
//! Every layer produces a `CheckResult` carrying a human-readable label and
//! the matched rule; the verdict is the conjunction of all of them.
//!
//! # Example
//!
//! ```rust
//! use reach_engine_r::{Evaluator, FlowDescriptor, TopologySnapshot};
//!
//! let destination = TopologySnapshot::from_json(r#"{
//!     "endpoint": {
//!         "id": "i-web",
//!         "private_addresses": ["10.0.2.20"],
//!         "public_address": "198.51.100.20",
//!         "subnets": [],
//!         "security_groups": ["sg-web"]
//!     },
//!     "security_group_rules": [
//!         {"group_id": "sg-web", "direction": "ingress", "protocol": "tcp",
//!          "port_range": {"from": 443, "to": 443},
//!          "peer": {"cidr": "0.0.0.0/0"}}
//!     ]
//! }"#).unwrap();
//!
//! let flow = FlowDescriptor::builder()
//!     .protocol_str("tcp").unwrap()
//!     .port(443)
//!     .using_public_address()
//!     .build()
//!     .unwrap();
//!
//! let evaluation = Evaluator::default()
//!     .evaluate_from_address("203.0.113.7".parse().unwrap(), &destination, &flow)
//!     .unwrap();
//! assert!(evaluation.verdict);
//! ```
//!
//! # Check Order
//!
//! | Step | Check | Ports |
//! |------|-------|-------|
//! | 1 | Egress ACL at source subnets | destination port |
//! | 2 | Route from source to destination | - |
//! | 3 | Ingress ACL at destination subnets | destination port |
//! | 4 | Egress ACL at destination subnets | ephemeral range |
//! | 5 | Route from destination to source | - |
//! | 6 | Ingress ACL at source subnets | ephemeral range |
//! | 7 | Source security groups, egress | destination port |
//! | 8 | Destination security groups, ingress | destination port |
//!
//! ## Flow Syntax
//!
//! - `tcp`, `udp`, `icmp`, `all` or the codes `6`, `17`, `1`, `-1`
//! - `tcp/5985` - protocol and port together
//! - `49152,65535` or `49152-65535` - ephemeral range override

pub mod check;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod flow;
pub mod layers;
pub mod matcher;
pub mod parser;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod trace;
pub mod types;

// Re-export commonly used items
pub use check::{summarize, CheckKind, CheckResult, Metadata};
pub use error::{ConfigErrorKind, ReachError, Result};
pub use evaluator::{Evaluation, Evaluator, EvaluatorOptions};
pub use flow::{AddressingMode, FlowDescriptor, FlowDescriptorBuilder};
pub use parser::{parse_port_range, parse_proto_port, parse_protocol};
pub use snapshot::{
    AclEntry, Endpoint, NetworkAcl, Route, RouteDestination, RouteTable, RouteTarget,
    SecurityGroupPeer, SecurityGroupRule, Subnet, TopologySnapshot, RESERVED_RULE_NUMBER,
};
pub use types::{
    Direction, PortRange, Protocol, RuleAction, DEFAULT_EPHEMERAL_FROM, DEFAULT_EPHEMERAL_TO,
};

// Re-export source types
pub use source::{inspect, FileTopologySource, StaticTopologySource, TopologySource};

#[cfg(feature = "async")]
pub use source::{inspect_async, AsyncTopologySource};

// Re-export reporting and export helpers
pub use export::{render_terraform_inline, render_terraform_resources, NaclRuleSpec, NaclRulesSpec};
pub use report::{render_evaluation, render_route_tables, render_results, Verbosity};
pub use trace::{LogSink, MemorySink, NilSink, TraceSink};
