//! Topology sources.
//!
//! Resolve an endpoint id into the `TopologySnapshot` the evaluator
//! consumes. Fetching happens before evaluation; the evaluator itself never
//! performs I/O.

mod file;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ReachError, Result};
use crate::evaluator::{Evaluation, Evaluator};
use crate::flow::FlowDescriptor;
use crate::snapshot::TopologySnapshot;

pub use file::FileTopologySource;

#[cfg(feature = "async")]
use async_trait::async_trait;

/// Topology source interface.
pub trait TopologySource: Send + Sync {
    /// Fetch the snapshot of endpoint `id`.
    ///
    /// Returns `UnknownEndpoint` if the source has no such endpoint.
    fn fetch(&self, id: &str) -> Result<TopologySnapshot>;
}

/// Async topology source interface.
#[cfg(feature = "async")]
#[async_trait]
pub trait AsyncTopologySource: Send + Sync {
    /// Fetch the snapshot of endpoint `id` asynchronously.
    async fn fetch(&self, id: &str) -> Result<TopologySnapshot>;
}

/// In-memory source with predefined snapshots.
#[derive(Debug, Clone, Default)]
pub struct StaticTopologySource {
    snapshots: HashMap<String, TopologySnapshot>,
}

impl StaticTopologySource {
    /// Create a new empty static source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot under its endpoint id.
    pub fn add(&mut self, snapshot: TopologySnapshot) {
        self.snapshots.insert(snapshot.endpoint.id.clone(), snapshot);
    }

    /// Add a snapshot and return self for chaining.
    pub fn with_snapshot(mut self, snapshot: TopologySnapshot) -> Self {
        self.add(snapshot);
        self
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl TopologySource for StaticTopologySource {
    fn fetch(&self, id: &str) -> Result<TopologySnapshot> {
        self.snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| ReachError::UnknownEndpoint(id.to_string()))
    }
}

#[cfg(feature = "async")]
#[async_trait]
impl AsyncTopologySource for StaticTopologySource {
    async fn fetch(&self, id: &str) -> Result<TopologySnapshot> {
        TopologySource::fetch(self, id)
    }
}

/// Fetch both endpoints from `topology` and evaluate the flow between them.
pub fn inspect<S>(
    topology: &S,
    evaluator: &Evaluator,
    source_id: &str,
    destination_id: &str,
    flow: &FlowDescriptor,
) -> Result<Evaluation>
where
    S: TopologySource + ?Sized,
{
    let source = topology.fetch(source_id)?;
    let destination = topology.fetch(destination_id)?;
    debug!(source = source_id, destination = destination_id, "snapshots fetched");
    evaluator.evaluate(&source, &destination, flow)
}

/// Fetch both endpoints concurrently, then evaluate the flow between them.
#[cfg(feature = "async")]
pub async fn inspect_async<S>(
    topology: &S,
    evaluator: &Evaluator,
    source_id: &str,
    destination_id: &str,
    flow: &FlowDescriptor,
) -> Result<Evaluation>
where
    S: AsyncTopologySource + ?Sized,
{
    let (source, destination) =
        tokio::try_join!(topology.fetch(source_id), topology.fetch(destination_id))?;
    debug!(source = source_id, destination = destination_id, "snapshots fetched");
    evaluator.evaluate(&source, &destination, flow)
}
