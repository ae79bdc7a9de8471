use smallvec::SmallVec;

use crate::error::{inconsistent, Result};

/// Parent sentinel for root nodes.
pub const NULL_PARENT: i32 = -1;

/// Root id storage; almost every tree has a single root.
pub(crate) type RootSet = SmallVec<[i32; 4]>;

/// Immutable array-based representation of one local tree.
///
/// All arrays are indexed by global node id. Entries are only meaningful
/// for nodes with `in_tree(v)`; the rest keep construction defaults. Once
/// built, a graph is never mutated and may be shared freely across
/// concurrent readers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TreeGraph {
    pub(crate) tree_index: usize,
    pub(crate) parent: Vec<i32>,
    pub(crate) children_index: Vec<u32>,
    pub(crate) children_data: Vec<i32>,
    pub(crate) time: Vec<f32>,
    pub(crate) x: Vec<f32>,
    pub(crate) y: Vec<f32>,
    pub(crate) in_tree: Vec<bool>,
    pub(crate) num_tips: usize,
    pub(crate) roots: RootSet,
}

impl TreeGraph {
    /// Index of the local tree this graph was built for.
    pub fn tree_index(&self) -> usize {
        self.tree_index
    }

    /// Number of entries in the node arrays (the dataset's node count).
    pub fn num_nodes(&self) -> usize {
        self.parent.len()
    }

    /// Number of tips in this tree.
    pub fn num_tips(&self) -> usize {
        self.num_tips
    }

    /// Root node ids, ascending.
    pub fn roots(&self) -> &[i32] {
        &self.roots
    }

    /// Whether `v` is a member of this tree.
    pub fn in_tree(&self, v: usize) -> bool {
        self.in_tree.get(v).copied().unwrap_or(false)
    }

    /// Parent node id of `v`, or [`NULL_PARENT`].
    pub fn parent(&self, v: usize) -> i32 {
        self.parent[v]
    }

    /// Children of `v` in construction order.
    pub fn children(&self, v: usize) -> &[i32] {
        let lo = self.children_index[v] as usize;
        let hi = self.children_index[v + 1] as usize;
        &self.children_data[lo..hi]
    }

    /// Whether `v` is a tip (in-tree with no children).
    pub fn is_tip(&self, v: usize) -> bool {
        self.in_tree(v) && self.children(v).is_empty()
    }

    /// Normalized layout coordinate in `[0, 1]`.
    pub fn x(&self, v: usize) -> f32 {
        self.x[v]
    }

    /// Normalized time coordinate in `[0, 1]`; older nodes are near 0.
    pub fn y(&self, v: usize) -> f32 {
        self.y[v]
    }

    /// Raw node time copied from the dataset.
    pub fn time(&self, v: usize) -> f32 {
        self.time[v]
    }

    /// In-tree node ids, ascending.
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes()).filter(|&v| self.in_tree[v])
    }

    /// Checks the structural invariants: parent closure over membership,
    /// parent/CSR mutual consistency, and coordinate bounds.
    ///
    /// Used by tests and debug assertions; a violation here means the
    /// builder produced a corrupt graph.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_nodes();
        if self.children_index.len() != n + 1 {
            return Err(inconsistent("children_index length is not N + 1"));
        }
        for v in 0..n {
            if !self.in_tree[v] {
                continue;
            }
            let p = self.parent[v];
            if p != NULL_PARENT {
                let p = p as usize;
                if p >= n || !self.in_tree[p] {
                    return Err(inconsistent(format!("node {v} has out-of-tree parent {p}")));
                }
                let occurrences = self.children(p).iter().filter(|&&c| c == v as i32).count();
                if occurrences != 1 {
                    return Err(inconsistent(format!(
                        "node {v} appears {occurrences} times in children of {p}"
                    )));
                }
            }
            let (x, y) = (self.x[v], self.y[v]);
            if !(-1e-6..=1.0 + 1e-6).contains(&x) || !(-1e-6..=1.0 + 1e-6).contains(&y) {
                return Err(inconsistent(format!(
                    "node {v} has out-of-bounds coordinates ({x}, {y})"
                )));
            }
        }
        for v in 0..n {
            for &c in self.children(v) {
                if self.parent[c as usize] != v as i32 {
                    return Err(inconsistent(format!(
                        "CSR lists {c} under {v} but parent[{c}] disagrees"
                    )));
                }
            }
        }
        Ok(())
    }
}
