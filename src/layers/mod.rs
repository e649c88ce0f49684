//! Layer evaluators.
//!
//! Independent checks for the stateless ACL layer, route existence and the
//! stateful security-group layer. Each is a pure function of the snapshots
//! and the flow; normal mismatches come back as failing `CheckResult`s,
//! malformed snapshot data as errors.

pub mod acl;
pub mod route;
pub mod security_group;

pub use acl::{evaluate_acl, select_entry, AclQuery};
pub use route::evaluate_route;
pub use security_group::{evaluate_egress, evaluate_ingress};
