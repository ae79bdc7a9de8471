//! Columnar tables backing one tree sequence.

/// Node flag bit marking a sampled haplotype.
pub const NODE_IS_SAMPLE: u32 = 1;

/// Edge table: one row per genomic-interval-scoped parent/child link.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    /// Left (inclusive) genomic coordinate of the interval.
    pub left: Vec<f64>,
    /// Right (exclusive) genomic coordinate of the interval.
    pub right: Vec<f64>,
    /// Parent node id per edge.
    pub parent: Vec<i32>,
    /// Child node id per edge.
    pub child: Vec<i32>,
}

impl EdgeTable {
    /// Number of edge rows.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Node table: per-node time, flags, and an optional raw metadata blob.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    /// Node time (age; larger values are further in the past).
    pub time: Vec<f32>,
    /// Bit flags; see [`NODE_IS_SAMPLE`].
    pub flags: Vec<u32>,
    /// Raw JSON metadata per node, decoded on demand.
    pub metadata: Vec<Option<String>>,
}

impl NodeTable {
    /// Number of node rows.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Whether `node` carries the sample flag.
    pub fn is_sample(&self, node: usize) -> bool {
        self.flags.get(node).is_some_and(|f| f & NODE_IS_SAMPLE != 0)
    }
}

/// Mutation table: genomic position plus the node the mutation sits above.
#[derive(Debug, Clone, Default)]
pub struct MutationTable {
    /// Genomic position of the mutation's site.
    pub position: Vec<f64>,
    /// Node id the mutation is attached to.
    pub node: Vec<i32>,
}

impl MutationTable {
    /// Number of mutation rows.
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}
