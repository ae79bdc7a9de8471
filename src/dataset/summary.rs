use serde::Serialize;

use super::Dataset;

/// Derived at-a-glance description of a loaded dataset, computed once per
/// load and cached alongside it in the file cache.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Total genome length (the last breakpoint).
    pub genome_length: f64,
    /// Number of local trees.
    pub num_trees: usize,
    /// Number of nodes in the node table.
    pub num_nodes: usize,
    /// Number of mutation rows.
    pub num_mutations: usize,
    /// Node ids carrying the sample flag.
    pub samples: Vec<i32>,
    /// Smallest node time in the table.
    pub min_time: f32,
    /// Largest node time in the table.
    pub max_time: f32,
    /// Union of top-level metadata keys observed across nodes, sorted.
    pub metadata_keys: Vec<String>,
}

impl Summary {
    /// Computes the summary for `dataset`.
    pub fn derive(dataset: &Dataset) -> Summary {
        let nodes = &dataset.nodes;
        let mut min_time = f32::INFINITY;
        let mut max_time = f32::NEG_INFINITY;
        for &t in &nodes.time {
            min_time = min_time.min(t);
            max_time = max_time.max(t);
        }
        if nodes.time.is_empty() {
            min_time = 0.0;
            max_time = 0.0;
        }

        let samples = (0..nodes.len())
            .filter(|&v| nodes.is_sample(v))
            .map(|v| v as i32)
            .collect();

        let mut keys = std::collections::BTreeSet::new();
        for blob in nodes.metadata.iter().flatten() {
            if let Ok(value) = crate::dataset::MetaValue::decode(blob) {
                for key in value.keys() {
                    if !keys.contains(key) {
                        keys.insert(key.to_string());
                    }
                }
            }
        }

        Summary {
            genome_length: dataset.breakpoints().last().copied().unwrap_or(0.0),
            num_trees: dataset.num_trees(),
            num_nodes: nodes.len(),
            num_mutations: dataset.mutations.len(),
            samples,
            min_time,
            max_time,
            metadata_keys: keys.into_iter().collect(),
        }
    }
}
