//! In-memory tree sequence: columnar edge/node/mutation tables plus the
//! breakpoint boundaries separating local trees.

mod loader;
mod metadata;
mod summary;
mod tables;

pub use loader::{DatasetLoader, JsonDatasetLoader};
pub use metadata::MetaValue;
pub use summary::Summary;
pub use tables::{EdgeTable, MutationTable, NodeTable, NODE_IS_SAMPLE};

use crate::error::{inconsistent, LayoutError, Result};

/// One opened tree sequence. Read-only after construction; shared across
/// concurrent layout and lineage requests via the file cache.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Edge rows with genomic intervals.
    pub edges: EdgeTable,
    /// Per-node times, flags, and metadata.
    pub nodes: NodeTable,
    /// Mutation rows.
    pub mutations: MutationTable,
    breakpoints: Vec<f64>,
}

impl Dataset {
    /// Assembles a dataset from its tables, validating referential
    /// integrity. An edge or mutation referencing a node outside the node
    /// table is an `Inconsistent` error.
    pub fn new(
        edges: EdgeTable,
        nodes: NodeTable,
        mutations: MutationTable,
        breakpoints: Vec<f64>,
    ) -> Result<Dataset> {
        let n = nodes.len() as i32;
        if edges.right.len() != edges.len()
            || edges.parent.len() != edges.len()
            || edges.child.len() != edges.len()
        {
            return Err(inconsistent("edge table columns have unequal lengths"));
        }
        if nodes.flags.len() != nodes.len() || nodes.metadata.len() != nodes.len() {
            return Err(inconsistent("node table columns have unequal lengths"));
        }
        if mutations.node.len() != mutations.len() {
            return Err(inconsistent("mutation table columns have unequal lengths"));
        }
        for e in 0..edges.len() {
            if edges.parent[e] < 0 || edges.parent[e] >= n || edges.child[e] < 0 || edges.child[e] >= n {
                return Err(inconsistent(format!(
                    "edge {e} references node outside table of {n} nodes"
                )));
            }
            if edges.left[e] >= edges.right[e] {
                return Err(inconsistent(format!("edge {e} has an empty interval")));
            }
        }
        for m in 0..mutations.len() {
            if mutations.node[m] < 0 || mutations.node[m] >= n {
                return Err(inconsistent(format!(
                    "mutation {m} references node outside table of {n} nodes"
                )));
            }
        }
        if breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(inconsistent("breakpoints are not strictly increasing"));
        }
        Ok(Dataset {
            edges,
            nodes,
            mutations,
            breakpoints,
        })
    }

    /// Number of local trees.
    pub fn num_trees(&self) -> usize {
        self.breakpoints.len().saturating_sub(1)
    }

    /// Number of nodes in the node table.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Breakpoint boundaries; `num_trees() + 1` entries when non-empty.
    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    /// Genomic interval `[left, right)` covered by `tree_index`.
    pub fn tree_bounds(&self, tree_index: usize) -> Result<(f64, f64)> {
        if tree_index >= self.num_trees() {
            return Err(LayoutError::InvalidIndex(tree_index));
        }
        Ok((self.breakpoints[tree_index], self.breakpoints[tree_index + 1]))
    }

    /// Global `(min_time, max_time)` over the node table.
    pub fn time_range(&self) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &t in &self.nodes.time {
            min = min.min(t);
            max = max.max(t);
        }
        if self.nodes.time.is_empty() {
            (0.0, 0.0)
        } else {
            (min, max)
        }
    }

    /// Mutation rows whose position falls in `[left, right)`.
    pub fn mutations_in(&self, left: f64, right: f64) -> impl Iterator<Item = (usize, i32)> + '_ {
        (0..self.mutations.len()).filter_map(move |m| {
            let pos = self.mutations.position[m];
            (pos >= left && pos < right).then_some((m, self.mutations.node[m]))
        })
    }
}
