use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{Dataset, EdgeTable, MutationTable, NodeTable};
use crate::error::{LayoutError, Result};

/// Source of datasets for the file cache. Implementations may read local
/// files directly or fetch a local copy from object storage first; the
/// cache only needs a loaded [`Dataset`] back.
pub trait DatasetLoader: Send + Sync + 'static {
    /// Opens and parses the dataset at `path`.
    fn load(&self, path: &Path) -> Result<Dataset>;
}

/// Loads datasets from a JSON table dump.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDatasetLoader;

#[derive(Deserialize)]
struct RawDataset {
    breakpoints: Vec<f64>,
    edges: RawEdges,
    nodes: RawNodes,
    #[serde(default)]
    mutations: RawMutations,
}

#[derive(Deserialize)]
struct RawEdges {
    left: Vec<f64>,
    right: Vec<f64>,
    parent: Vec<i32>,
    child: Vec<i32>,
}

#[derive(Deserialize)]
struct RawNodes {
    time: Vec<f32>,
    #[serde(default)]
    flags: Vec<u32>,
    #[serde(default)]
    metadata: Vec<Option<String>>,
}

#[derive(Deserialize, Default)]
struct RawMutations {
    #[serde(default)]
    position: Vec<f64>,
    #[serde(default)]
    node: Vec<i32>,
}

impl DatasetLoader for JsonDatasetLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LayoutError::NotFound(path.to_path_buf()),
            _ => LayoutError::Io(e),
        })?;
        let raw: RawDataset = serde_json::from_slice(&bytes)
            .map_err(|e| LayoutError::LoadError(format!("{}: {e}", path.display())))?;

        let num_nodes = raw.nodes.time.len();
        let mut flags = raw.nodes.flags;
        flags.resize(num_nodes, 0);
        let mut metadata = raw.nodes.metadata;
        metadata.resize(num_nodes, None);

        let dataset = Dataset::new(
            EdgeTable {
                left: raw.edges.left,
                right: raw.edges.right,
                parent: raw.edges.parent,
                child: raw.edges.child,
            },
            NodeTable {
                time: raw.nodes.time,
                flags,
                metadata,
            },
            MutationTable {
                position: raw.mutations.position,
                node: raw.mutations.node,
            },
            raw.breakpoints,
        )
        .map_err(|e| LayoutError::LoadError(format!("{}: {e}", path.display())))?;

        debug!(
            path = %path.display(),
            nodes = dataset.num_nodes(),
            trees = dataset.num_trees(),
            "dataset loaded"
        );
        Ok(dataset)
    }
}
