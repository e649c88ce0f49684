use std::collections::HashSet;
use std::net::IpAddr;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::check::{CheckKind, CheckResult, Metadata};
use crate::error::Result;
use crate::matcher::matches_cidr;
use crate::snapshot::{Route, RouteDestination, RouteTable, TopologySnapshot};

fn describe_route(table: &RouteTable, route: &Route) -> Value {
    json!({
        "route_table_id": table.id,
        "main": table.main,
        "destination": route.destination.to_string(),
        "target_kind": route.target.kind(),
        "target": route.target.to_string(),
    })
}

/// Check whether any route of the owner's subnets covers `destination`.
///
/// Existence is all that is asked: no longest-prefix selection happens.
/// Routes through a NAT instance without a resolved interface are not a
/// usable path and are reported separately.
pub fn evaluate_route(
    owner: &TopologySnapshot,
    destination: IpAddr,
    kind: CheckKind,
    label: impl Into<String>,
) -> Result<CheckResult> {
    let mut seen_tables = HashSet::new();
    let mut matched = Vec::new();
    let mut unusable = Vec::new();

    for subnet in &owner.endpoint.subnets {
        for table in owner.route_tables_for(subnet)? {
            if !seen_tables.insert(table.id.as_str()) {
                continue;
            }
            for route in &table.routes {
                let cidr = match &route.destination {
                    RouteDestination::Cidr(cidr) => cidr,
                    RouteDestination::PrefixList(id) => {
                        debug!(route_table = %table.id, prefix_list = %id, "skipping prefix-list route");
                        continue;
                    }
                };
                if !matches_cidr(cidr, destination)? {
                    continue;
                }
                if route.target.is_usable() {
                    matched.push(describe_route(table, route));
                } else {
                    warn!(
                        route_table = %table.id,
                        target = %route.target,
                        "NAT instance route without a resolvable network interface"
                    );
                    unusable.push(describe_route(table, route));
                }
            }
        }
    }

    let passed = !matched.is_empty();

    let mut metadata = Metadata::new();
    metadata.insert("destination_address".into(), Value::from(destination.to_string()));
    metadata.insert("matched_routes".into(), Value::Array(matched));
    if !unusable.is_empty() {
        metadata.insert("unusable_routes".into(), Value::Array(unusable));
    }

    debug!(endpoint = %owner.endpoint.id, %destination, passed, "route check");

    Ok(CheckResult::new(kind, label, passed, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigErrorKind;
    use crate::snapshot::{Endpoint, NetworkAcl, RouteTarget, Subnet};

    fn owner(tables: Vec<RouteTable>, subnet_ids: &[&str]) -> TopologySnapshot {
        TopologySnapshot {
            endpoint: Endpoint {
                id: "i-1".to_string(),
                subnets: subnet_ids
                    .iter()
                    .map(|id| Subnet {
                        id: id.to_string(),
                        vpc_id: "vpc-1".to_string(),
                        cidr: "10.0.1.0/24".to_string(),
                        network_acl: NetworkAcl::default(),
                    })
                    .collect(),
                ..Default::default()
            },
            route_tables: tables,
            security_group_rules: Vec::new(),
        }
    }

    fn table(id: &str, main: bool, subnet_ids: &[&str], routes: Vec<Route>) -> RouteTable {
        RouteTable {
            id: id.to_string(),
            vpc_id: "vpc-1".to_string(),
            main,
            subnet_ids: subnet_ids.iter().map(|s| s.to_string()).collect(),
            routes,
        }
    }

    fn route(cidr: &str, target: RouteTarget) -> Route {
        Route {
            destination: RouteDestination::Cidr(cidr.to_string()),
            target,
        }
    }

    #[test]
    fn test_local_route_matches() {
        let snapshot = owner(
            vec![table("rtb-main", true, &[], vec![route("10.0.0.0/16", RouteTarget::Local)])],
            &["subnet-a"],
        );
        let result = evaluate_route(
            &snapshot,
            "10.0.2.9".parse().unwrap(),
            CheckKind::SourceRoute,
            "Route exists from Source to Destination",
        )
        .unwrap();
        assert!(result.passed);
        let routes = result.get("matched_routes").unwrap().as_array().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0]["target_kind"], "local");
        assert_eq!(routes[0]["route_table_id"], "rtb-main");
    }

    #[test]
    fn test_no_route_is_reported_failure() {
        let snapshot = owner(
            vec![table("rtb-main", true, &[], vec![route("10.0.0.0/16", RouteTarget::Local)])],
            &["subnet-a"],
        );
        let result = evaluate_route(
            &snapshot,
            "203.0.113.5".parse().unwrap(),
            CheckKind::DestinationRoute,
            "Route exists from Destination to Source",
        )
        .unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn test_explicit_table_shadows_main() {
        let snapshot = owner(
            vec![
                table(
                    "rtb-main",
                    true,
                    &[],
                    vec![route("0.0.0.0/0", RouteTarget::InternetGateway("igw-1".into()))],
                ),
                table("rtb-private", false, &["subnet-a"], vec![route("10.0.0.0/16", RouteTarget::Local)]),
            ],
            &["subnet-a"],
        );
        let result = evaluate_route(
            &snapshot,
            "198.51.100.1".parse().unwrap(),
            CheckKind::SourceRoute,
            "route",
        )
        .unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn test_any_subnet_route_suffices() {
        let snapshot = owner(
            vec![
                table("rtb-a", false, &["subnet-a"], vec![route("10.0.0.0/16", RouteTarget::Local)]),
                table(
                    "rtb-b",
                    false,
                    &["subnet-b"],
                    vec![route("0.0.0.0/0", RouteTarget::NatGateway("nat-1".into()))],
                ),
            ],
            &["subnet-a", "subnet-b"],
        );
        let result = evaluate_route(
            &snapshot,
            "198.51.100.1".parse().unwrap(),
            CheckKind::SourceRoute,
            "route",
        )
        .unwrap();
        assert!(result.passed);
        let routes = result.get("matched_routes").unwrap().as_array().unwrap();
        assert_eq!(routes[0]["target"], "nat-1");
    }

    #[test]
    fn test_nat_instance_without_interface_is_not_a_path() {
        let snapshot = owner(
            vec![table(
                "rtb-main",
                true,
                &[],
                vec![route(
                    "0.0.0.0/0",
                    RouteTarget::NatInstance {
                        instance_id: "i-nat".into(),
                        network_interface_id: None,
                    },
                )],
            )],
            &["subnet-a"],
        );
        let result = evaluate_route(
            &snapshot,
            "198.51.100.1".parse().unwrap(),
            CheckKind::SourceRoute,
            "route",
        )
        .unwrap();
        assert!(!result.passed);
        let unusable = result.get("unusable_routes").unwrap().as_array().unwrap();
        assert_eq!(unusable[0]["target"], "i-nat - (No ENI)");
    }

    #[test]
    fn test_prefix_list_routes_are_skipped() {
        let snapshot = owner(
            vec![table(
                "rtb-main",
                true,
                &[],
                vec![Route {
                    destination: RouteDestination::PrefixList("pl-6ca54005".into()),
                    target: RouteTarget::VpcEndpoint("vpce-1".into()),
                }],
            )],
            &["subnet-a"],
        );
        let result = evaluate_route(
            &snapshot,
            "52.216.0.1".parse().unwrap(),
            CheckKind::SourceRoute,
            "route",
        )
        .unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn test_two_main_tables_abort() {
        let snapshot = owner(
            vec![
                table("rtb-1", true, &[], Vec::new()),
                table("rtb-2", true, &[], Vec::new()),
            ],
            &["subnet-a"],
        );
        let err = evaluate_route(
            &snapshot,
            "10.0.0.1".parse().unwrap(),
            CheckKind::SourceRoute,
            "route",
        )
        .unwrap_err();
        assert_eq!(
            err.config_kind(),
            Some(ConfigErrorKind::MultipleMainRouteTables)
        );
    }
}
