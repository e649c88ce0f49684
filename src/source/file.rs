use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::TopologySource;
use crate::error::{ReachError, Result};
use crate::snapshot::TopologySnapshot;

#[cfg(feature = "async")]
use super::AsyncTopologySource;
#[cfg(feature = "async")]
use async_trait::async_trait;

/// Source reading `<id>.json` snapshot documents from a directory.
#[derive(Debug, Clone)]
pub struct FileTopologySource {
    root: PathBuf,
}

impl FileTopologySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the document for `id`; ids never escape the directory.
    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(ReachError::UnknownEndpoint(id.to_string()));
        }
        Ok(self.root.join(format!("{}.json", id)))
    }

    fn decode(&self, id: &str, path: &Path, read: io::Result<String>) -> Result<TopologySnapshot> {
        let text = read.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ReachError::UnknownEndpoint(id.to_string()),
            _ => ReachError::IoError(e),
        })?;
        let snapshot = TopologySnapshot::from_json(&text)?;
        if snapshot.endpoint.id != id {
            warn!(
                path = %path.display(),
                endpoint = %snapshot.endpoint.id,
                "snapshot endpoint id differs from its file name"
            );
        }
        debug!(path = %path.display(), subnets = snapshot.endpoint.subnets.len(), "loaded snapshot");
        Ok(snapshot)
    }
}

impl TopologySource for FileTopologySource {
    fn fetch(&self, id: &str) -> Result<TopologySnapshot> {
        let path = self.path_for(id)?;
        self.decode(id, &path, fs::read_to_string(&path))
    }
}

#[cfg(feature = "async")]
#[async_trait]
impl AsyncTopologySource for FileTopologySource {
    async fn fetch(&self, id: &str) -> Result<TopologySnapshot> {
        let path = self.path_for(id)?;
        let read = tokio::fs::read_to_string(&path).await;
        self.decode(id, &path, read)
    }
}
