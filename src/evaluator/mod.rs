//! Reachability orchestrator.
//!
//! Sequences the layer checks of a flow in a fixed order, collects every
//! result (failures do not stop the run) and folds them into a verdict.

use std::net::IpAddr;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::check::{summarize, CheckKind, CheckResult, Metadata};
use crate::error::{ConfigErrorKind, ReachError, Result};
use crate::flow::{AddressingMode, FlowDescriptor};
use crate::layers::{evaluate_acl, evaluate_egress, evaluate_ingress, evaluate_route, AclQuery};
use crate::parser::ordered;
use crate::snapshot::TopologySnapshot;
use crate::trace::{NilSink, TraceSink};
use crate::types::{Direction, PortRange};

/// Evaluator options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorOptions {
    /// Client-side range for return legs when the flow has no override
    pub ephemeral_range: PortRange,
    /// Run the layer checks on scoped threads
    pub concurrent: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            ephemeral_range: PortRange::default_ephemeral(),
            concurrent: false,
        }
    }
}

impl EvaluatorOptions {
    /// Create new evaluator options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default ephemeral port range.
    pub fn with_ephemeral_range(mut self, range: PortRange) -> Self {
        self.ephemeral_range = range;
        self
    }

    /// Enable or disable concurrent check dispatch.
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }
}

/// Ordered check results and the verdict folded from them
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub results: Vec<CheckResult>,
    pub verdict: bool,
}

impl Evaluation {
    fn from_results(results: Vec<CheckResult>) -> Self {
        let verdict = summarize(&results);
        Self { results, verdict }
    }

    pub fn results_for(&self, kind: CheckKind) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(move |r| r.kind == kind)
    }

    /// Whether every result of `kind` passed; `None` if the check did not run.
    pub fn passed(&self, kind: CheckKind) -> Option<bool> {
        let mut results = self.results_for(kind).peekable();
        results.peek()?;
        Some(results.all(|r| r.passed))
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Kinds executed, in order, without repetition
    pub fn kinds(&self) -> Vec<CheckKind> {
        let mut kinds: Vec<CheckKind> = Vec::new();
        for result in &self.results {
            if kinds.last() != Some(&result.kind) {
                kinds.push(result.kind);
            }
        }
        kinds
    }
}

/// Everything a single check needs, resolved once per evaluation
struct FlowContext<'a> {
    source: &'a TopologySnapshot,
    destination: &'a TopologySnapshot,
    flow: &'a FlowDescriptor,
    destination_address: IpAddr,
    source_addresses: Vec<IpAddr>,
    ephemeral: PortRange,
}

impl FlowContext<'_> {
    fn acl_query(&self, peer: IpAddr, ports: PortRange, direction: Direction) -> AclQuery {
        AclQuery {
            peer,
            protocol: self.flow.protocol,
            ports,
            direction,
        }
    }

    fn run(&self, kind: CheckKind) -> Result<Vec<CheckResult>> {
        let forward = self.flow.destination_ports();
        let source = self.source;
        let destination = self.destination;

        match kind {
            CheckKind::SourceEgressAcl => evaluate_acl(
                &source.endpoint,
                &self.acl_query(self.destination_address, forward, Direction::Egress),
                kind,
            ),
            CheckKind::SourceRoute => Ok(vec![evaluate_route(
                source,
                self.destination_address,
                kind,
                "Route exists from Source to Destination",
            )?]),
            CheckKind::DestinationIngressAcl => self.per_source_address(kind, |address| {
                evaluate_acl(
                    &destination.endpoint,
                    &self.acl_query(address, forward, Direction::Ingress),
                    kind,
                )
            }),
            CheckKind::DestinationEgressAcl => self.per_source_address(kind, |address| {
                evaluate_acl(
                    &destination.endpoint,
                    &self.acl_query(address, self.ephemeral, Direction::Egress),
                    kind,
                )
            }),
            CheckKind::DestinationRoute => self.per_source_address(kind, |address| {
                Ok(vec![evaluate_route(
                    destination,
                    address,
                    kind,
                    format!("Route exists from Destination to Source {}", address),
                )?])
            }),
            CheckKind::SourceIngressAcl => evaluate_acl(
                &source.endpoint,
                &self.acl_query(self.destination_address, self.ephemeral, Direction::Ingress),
                kind,
            ),
            CheckKind::SourceSecurityGroupEgress => Ok(vec![evaluate_egress(
                source,
                &destination.endpoint,
                self.destination_address,
                self.flow,
            )?]),
            CheckKind::DestinationSecurityGroupIngress => Ok(vec![evaluate_ingress(
                destination,
                &source.endpoint,
                &self.source_addresses,
                self.flow,
            )?]),
        }
    }

    /// Run a destination-side check once per address the source sends from.
    fn per_source_address<F>(&self, kind: CheckKind, check: F) -> Result<Vec<CheckResult>>
    where
        F: Fn(IpAddr) -> Result<Vec<CheckResult>>,
    {
        if self.source_addresses.is_empty() {
            return Ok(vec![missing_source_address(kind, self.flow)]);
        }
        let mut results = Vec::new();
        for address in &self.source_addresses {
            results.extend(check(*address)?);
        }
        Ok(results)
    }
}

/// A source without an address in the flow's mode cannot pass any
/// destination-side check.
fn missing_source_address(kind: CheckKind, flow: &FlowDescriptor) -> CheckResult {
    let mode = if flow.is_public() { "public" } else { "private" };
    let mut metadata = Metadata::new();
    metadata.insert("missing_source_address".into(), Value::from(mode));
    CheckResult::new(
        kind,
        format!("{}: source has no {} address", kind, mode),
        false,
        metadata,
    )
}

fn destination_address(destination: &TopologySnapshot, flow: &FlowDescriptor) -> Result<IpAddr> {
    let endpoint = &destination.endpoint;
    match flow.mode {
        AddressingMode::PrivateAddress(address) => {
            if !endpoint.private_addresses.is_empty()
                && !endpoint.private_addresses.contains(&address)
            {
                warn!(
                    destination = %endpoint.id,
                    %address,
                    "requested private address is not assigned to the destination"
                );
            }
            Ok(address)
        }
        AddressingMode::PublicAddress => endpoint.public_address.ok_or_else(|| {
            ReachError::config(
                ConfigErrorKind::MissingField,
                format!("destination {} has no public address", endpoint.id),
            )
        }),
    }
}

fn source_addresses(source: &TopologySnapshot, flow: &FlowDescriptor) -> Vec<IpAddr> {
    match flow.mode {
        AddressingMode::PublicAddress => source.endpoint.public_address.into_iter().collect(),
        AddressingMode::PrivateAddress(_) => source.endpoint.private_addresses.clone(),
    }
}

/// Checks that apply to a pair of snapshots.
///
/// Endpoints without subnets have no modeled ACLs or routes; an external
/// source additionally has no security groups of its own.
fn plan(source: &TopologySnapshot, destination: &TopologySnapshot, external_source: bool) -> Vec<CheckKind> {
    CheckKind::ALL
        .iter()
        .copied()
        .filter(|kind| match kind {
            CheckKind::SourceEgressAcl | CheckKind::SourceRoute | CheckKind::SourceIngressAcl => {
                !external_source && source.has_subnets()
            }
            CheckKind::DestinationIngressAcl
            | CheckKind::DestinationEgressAcl
            | CheckKind::DestinationRoute => destination.has_subnets(),
            CheckKind::SourceSecurityGroupEgress => !external_source,
            CheckKind::DestinationSecurityGroupIngress => true,
        })
        .collect()
}

/// Reachability evaluator.
///
/// Holds no state between evaluations; each call is a pure function of the
/// snapshots and the flow, apart from writes to the trace sink.
pub struct Evaluator {
    options: EvaluatorOptions,
    sink: Arc<dyn TraceSink>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorOptions::default())
    }
}

impl Evaluator {
    /// Create a new evaluator discarding its trace.
    pub fn new(options: EvaluatorOptions) -> Self {
        Self {
            options,
            sink: Arc::new(NilSink),
        }
    }

    /// Send every check result to `sink` as it is produced.
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    /// Evaluate a flow between two modeled endpoints.
    pub fn evaluate(
        &self,
        source: &TopologySnapshot,
        destination: &TopologySnapshot,
        flow: &FlowDescriptor,
    ) -> Result<Evaluation> {
        self.run(source, destination, flow, false)
    }

    /// Evaluate a flow from an arbitrary external address to a modeled
    /// endpoint. Only destination-side checks apply.
    pub fn evaluate_from_address(
        &self,
        source: IpAddr,
        destination: &TopologySnapshot,
        flow: &FlowDescriptor,
    ) -> Result<Evaluation> {
        let external = TopologySnapshot::external(source);
        self.run(&external, destination, flow, true)
    }

    fn run(
        &self,
        source: &TopologySnapshot,
        destination: &TopologySnapshot,
        flow: &FlowDescriptor,
        external_source: bool,
    ) -> Result<Evaluation> {
        source.validate()?;
        destination.validate()?;
        let ephemeral = ordered(flow.ephemeral_range.unwrap_or(self.options.ephemeral_range))?;

        let ctx = FlowContext {
            source,
            destination,
            flow,
            destination_address: destination_address(destination, flow)?,
            source_addresses: source_addresses(source, flow),
            ephemeral,
        };
        let plan = plan(source, destination, external_source);

        debug!(
            source = %source.endpoint.id,
            destination = %destination.endpoint.id,
            protocol = %flow.protocol,
            port = flow.port,
            checks = plan.len(),
            concurrent = self.options.concurrent,
            "evaluating flow"
        );

        let groups = if self.options.concurrent {
            self.run_concurrent(&ctx, &plan)?
        } else {
            self.run_sequential(&ctx, &plan)?
        };

        let evaluation = Evaluation::from_results(groups.into_iter().flatten().collect());
        debug!(verdict = evaluation.verdict, results = evaluation.results.len(), "flow evaluated");
        Ok(evaluation)
    }

    fn run_check(&self, ctx: &FlowContext<'_>, kind: CheckKind) -> Result<Vec<CheckResult>> {
        let results = ctx.run(kind)?;
        for result in &results {
            self.sink.record(result);
        }
        Ok(results)
    }

    fn run_sequential(&self, ctx: &FlowContext<'_>, plan: &[CheckKind]) -> Result<Vec<Vec<CheckResult>>> {
        plan.iter().map(|kind| self.run_check(ctx, *kind)).collect()
    }

    /// Dispatch every check on its own scoped thread and reassemble the
    /// results in plan order.
    fn run_concurrent(&self, ctx: &FlowContext<'_>, plan: &[CheckKind]) -> Result<Vec<Vec<CheckResult>>> {
        thread::scope(|scope| {
            let handles: Vec<_> = plan
                .iter()
                .map(|kind| {
                    let kind = *kind;
                    scope.spawn(move || self.run_check(ctx, kind))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        AclEntry, Endpoint, NetworkAcl, Route, RouteDestination, RouteTable, RouteTarget,
        SecurityGroupPeer, SecurityGroupRule, Subnet,
    };
    use crate::trace::MemorySink;
    use crate::types::{Protocol, RuleAction};

    fn open_acl(id: &str) -> NetworkAcl {
        let allow = |direction| AclEntry {
            rule_number: 100,
            direction,
            protocol: Protocol::All,
            cidr: "0.0.0.0/0".to_string(),
            port_range: None,
            action: RuleAction::Allow,
        };
        NetworkAcl {
            id: id.to_string(),
            entries: vec![allow(Direction::Egress), allow(Direction::Ingress)],
        }
    }

    fn instance(id: &str, private: &str, public: Option<&str>, group: &str) -> TopologySnapshot {
        let subnet_id = format!("subnet-{}", id);
        TopologySnapshot {
            endpoint: Endpoint {
                id: id.to_string(),
                private_addresses: vec![private.parse().unwrap()],
                public_address: public.map(|p| p.parse().unwrap()),
                subnets: vec![Subnet {
                    id: subnet_id,
                    vpc_id: "vpc-1".to_string(),
                    cidr: "10.0.0.0/16".to_string(),
                    network_acl: open_acl(&format!("acl-{}", id)),
                }],
                security_groups: vec![group.to_string()],
            },
            route_tables: vec![RouteTable {
                id: "rtb-main".to_string(),
                vpc_id: "vpc-1".to_string(),
                main: true,
                subnet_ids: Vec::new(),
                routes: vec![
                    Route {
                        destination: RouteDestination::Cidr("10.0.0.0/16".to_string()),
                        target: RouteTarget::Local,
                    },
                    Route {
                        destination: RouteDestination::Cidr("0.0.0.0/0".to_string()),
                        target: RouteTarget::InternetGateway("igw-1".to_string()),
                    },
                ],
            }],
            security_group_rules: vec![
                SecurityGroupRule {
                    group_id: group.to_string(),
                    direction: Direction::Egress,
                    protocol: Protocol::All,
                    port_range: None,
                    peer: SecurityGroupPeer::Cidr("0.0.0.0/0".to_string()),
                },
                SecurityGroupRule {
                    group_id: group.to_string(),
                    direction: Direction::Ingress,
                    protocol: Protocol::Tcp,
                    port_range: Some(PortRange::single(22)),
                    peer: SecurityGroupPeer::Cidr("0.0.0.0/0".to_string()),
                },
            ],
        }
    }

    fn ssh_flow() -> FlowDescriptor {
        FlowDescriptor::builder()
            .protocol(Protocol::Tcp)
            .port(22)
            .destination_private_address("10.0.2.20".parse().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_full_plan_runs_eight_checks_in_order() {
        let src = instance("src", "10.0.1.10", None, "sg-src");
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        let evaluation = Evaluator::default().evaluate(&src, &dst, &ssh_flow()).unwrap();
        assert!(evaluation.verdict);
        assert_eq!(evaluation.results.len(), 8);
        assert_eq!(evaluation.kinds(), CheckKind::ALL.to_vec());
    }

    #[test]
    fn test_failures_do_not_stop_later_checks() {
        let src = instance("src", "10.0.1.10", None, "sg-src");
        let mut dst = instance("dst", "10.0.2.20", None, "sg-dst");
        dst.endpoint.subnets[0].network_acl.entries.clear();
        let evaluation = Evaluator::default().evaluate(&src, &dst, &ssh_flow()).unwrap();
        assert!(!evaluation.verdict);
        assert_eq!(evaluation.results.len(), 8);
        assert_eq!(evaluation.passed(CheckKind::DestinationIngressAcl), Some(false));
        assert_eq!(evaluation.passed(CheckKind::DestinationEgressAcl), Some(false));
        assert_eq!(evaluation.passed(CheckKind::DestinationSecurityGroupIngress), Some(true));
        assert_eq!(evaluation.failures().count(), 2);
    }

    #[test]
    fn test_concurrent_matches_sequential() {
        let src = instance("src", "10.0.1.10", None, "sg-src");
        let mut dst = instance("dst", "10.0.2.20", None, "sg-dst");
        dst.security_group_rules.pop();

        let sequential = Evaluator::default().evaluate(&src, &dst, &ssh_flow()).unwrap();
        let sink = Arc::new(MemorySink::new());
        let concurrent = Evaluator::new(EvaluatorOptions::new().with_concurrency(true))
            .with_sink(sink.clone())
            .evaluate(&src, &dst, &ssh_flow())
            .unwrap();

        assert_eq!(sequential.results, concurrent.results);
        assert_eq!(sequential.verdict, concurrent.verdict);
        assert!(!concurrent.verdict);
        assert_eq!(sink.len(), concurrent.results.len());
    }

    #[test]
    fn test_sink_receives_sequential_results_in_order() {
        let src = instance("src", "10.0.1.10", None, "sg-src");
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        let sink = Arc::new(MemorySink::new());
        let evaluation = Evaluator::default()
            .with_sink(sink.clone())
            .evaluate(&src, &dst, &ssh_flow())
            .unwrap();
        assert_eq!(sink.results(), evaluation.results);
    }

    #[test]
    fn test_flow_override_wins_over_options_ephemeral_range() {
        let mut src = instance("src", "10.0.1.10", None, "sg-src");
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        src.endpoint.subnets[0].network_acl.entries[1] = AclEntry {
            rule_number: 100,
            direction: Direction::Ingress,
            protocol: Protocol::Tcp,
            cidr: "0.0.0.0/0".to_string(),
            port_range: Some(PortRange::new(49152, 65535)),
            action: RuleAction::Allow,
        };

        let evaluator = Evaluator::default();
        let evaluation = evaluator.evaluate(&src, &dst, &ssh_flow()).unwrap();
        assert_eq!(evaluation.passed(CheckKind::SourceIngressAcl), Some(false));

        let mut flow = ssh_flow();
        flow.ephemeral_range = Some(PortRange::new(49152, 65535));
        let evaluation = evaluator.evaluate(&src, &dst, &flow).unwrap();
        assert_eq!(evaluation.passed(CheckKind::SourceIngressAcl), Some(true));

        let evaluator = Evaluator::new(
            EvaluatorOptions::new().with_ephemeral_range(PortRange::new(50000, 60000)),
        );
        let evaluation = evaluator.evaluate(&src, &dst, &ssh_flow()).unwrap();
        assert_eq!(evaluation.passed(CheckKind::SourceIngressAcl), Some(true));
    }

    #[test]
    fn test_reversed_ephemeral_range_is_rejected() {
        let src = instance("src", "10.0.1.10", None, "sg-src");
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        let evaluator = Evaluator::new(
            EvaluatorOptions::new().with_ephemeral_range(PortRange::new(60000, 50000)),
        );
        let err = evaluator.evaluate(&src, &dst, &ssh_flow()).unwrap_err();
        assert!(matches!(err, ReachError::InvalidPortRange(_)));

        let mut flow = ssh_flow();
        flow.ephemeral_range = Some(PortRange::new(2000, 1000));
        let err = Evaluator::default().evaluate(&src, &dst, &flow).unwrap_err();
        assert!(matches!(err, ReachError::InvalidPortRange(_)));
    }

    #[test]
    fn test_public_mode_requires_destination_public_address() {
        let src = instance("src", "10.0.1.10", Some("198.51.100.10"), "sg-src");
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        let flow = FlowDescriptor::builder()
            .protocol(Protocol::Tcp)
            .port(22)
            .using_public_address()
            .build()
            .unwrap();
        let err = Evaluator::default().evaluate(&src, &dst, &flow).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::MissingField));
    }

    #[test]
    fn test_public_mode_source_without_public_address_fails_destination_checks() {
        let src = instance("src", "10.0.1.10", None, "sg-src");
        let dst = instance("dst", "10.0.2.20", Some("198.51.100.20"), "sg-dst");
        let flow = FlowDescriptor::builder()
            .protocol(Protocol::Tcp)
            .port(22)
            .using_public_address()
            .build()
            .unwrap();
        let evaluation = Evaluator::default().evaluate(&src, &dst, &flow).unwrap();
        assert!(!evaluation.verdict);
        let ingress: Vec<_> = evaluation.results_for(CheckKind::DestinationIngressAcl).collect();
        assert_eq!(ingress.len(), 1);
        assert_eq!(
            ingress[0].get("missing_source_address"),
            Some(&Value::from("public"))
        );
    }

    #[test]
    fn test_subnetless_endpoints_skip_acl_and_route_checks() {
        let mut src = instance("src", "10.0.1.10", None, "sg-src");
        src.endpoint.subnets.clear();
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        let evaluation = Evaluator::default().evaluate(&src, &dst, &ssh_flow()).unwrap();
        assert_eq!(
            evaluation.kinds(),
            vec![
                CheckKind::DestinationIngressAcl,
                CheckKind::DestinationEgressAcl,
                CheckKind::DestinationRoute,
                CheckKind::SourceSecurityGroupEgress,
                CheckKind::DestinationSecurityGroupIngress,
            ]
        );
    }

    #[test]
    fn test_malformed_snapshot_aborts_instead_of_failing() {
        let mut src = instance("src", "10.0.1.10", None, "sg-src");
        let dst = instance("dst", "10.0.2.20", None, "sg-dst");
        src.security_group_rules[0].peer = SecurityGroupPeer::Cidr("0.0.0.0/64".to_string());
        let sink = Arc::new(MemorySink::new());
        let err = Evaluator::default()
            .with_sink(sink.clone())
            .evaluate(&src, &dst, &ssh_flow())
            .unwrap_err();
        assert!(err.is_fatal_configuration());
        assert!(sink.is_empty());
    }
}
