//! Construction of traversable trees from tabular edge/node data.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::sparsify::{sparsify, sparsify_mutations, SparseView, SparsifyParams, ViewMutation};
use super::tree::{RootSet, TreeGraph, NULL_PARENT};
use super::wire::{encode_layout, MutationRows, NodeRows};
use crate::dataset::{Dataset, EdgeTable, NodeTable};
use crate::error::Result;

/// Builds the graph for one local tree.
///
/// Fails with `InvalidIndex` when `tree_index` is out of range. A tree
/// with no active edges is not an error; it yields a valid graph with
/// zero tips.
pub fn construct_tree(dataset: &Dataset, tree_index: usize) -> Result<TreeGraph> {
    let (left, _) = dataset.tree_bounds(tree_index)?;
    let (min_time, max_time) = dataset.time_range();
    Ok(build_tree(
        &dataset.edges,
        &dataset.nodes,
        left,
        min_time,
        max_time,
        tree_index,
    ))
}

/// Core construction over pre-extracted tables, shared by the single and
/// batch entry points so a batch amortizes table access once.
fn build_tree(
    edges: &EdgeTable,
    nodes: &NodeTable,
    boundary: f64,
    min_time: f32,
    max_time: f32,
    tree_index: usize,
) -> TreeGraph {
    let n = nodes.len();

    // Edges active at the tree's left boundary.
    let active: Vec<usize> = (0..edges.len())
        .filter(|&e| edges.left[e] <= boundary && boundary < edges.right[e])
        .collect();

    let mut parent = vec![NULL_PARENT; n];
    let mut in_tree = vec![false; n];
    let mut child_count = vec![0u32; n];
    for &e in &active {
        let p = edges.parent[e] as usize;
        let c = edges.child[e] as usize;
        parent[c] = edges.parent[e];
        in_tree[c] = true;
        in_tree[p] = true;
        child_count[p] += 1;
    }

    // CSR children: prefix-sum the counts, then a stable second pass in
    // edge-table order fills the buckets.
    let mut children_index = vec![0u32; n + 1];
    for v in 0..n {
        children_index[v + 1] = children_index[v] + child_count[v];
    }
    let mut cursor: Vec<u32> = children_index[..n].to_vec();
    let mut children_data = vec![0i32; active.len()];
    for &e in &active {
        let p = edges.parent[e] as usize;
        children_data[cursor[p] as usize] = edges.child[e];
        cursor[p] += 1;
    }

    let roots: RootSet = (0..n)
        .filter(|&v| in_tree[v] && parent[v] == NULL_PARENT)
        .map(|v| v as i32)
        .collect();

    // Layout x: iterative post-order from every root. Tips take sequential
    // ranks; internal nodes the midpoint of their children's extent.
    let mut x = vec![0.0f32; n];
    let mut tip_rank = 0u32;
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for &root in &roots {
        stack.push((root as usize, 0));
        while let Some((v, next_child)) = stack.pop() {
            let lo = children_index[v] as usize;
            let hi = children_index[v + 1] as usize;
            let kids = &children_data[lo..hi];
            if next_child < kids.len() {
                stack.push((v, next_child + 1));
                stack.push((kids[next_child] as usize, 0));
            } else if kids.is_empty() {
                x[v] = tip_rank as f32;
                tip_rank += 1;
            } else {
                let mut min = f32::INFINITY;
                let mut max = f32::NEG_INFINITY;
                for &c in kids {
                    let cx = x[c as usize];
                    min = min.min(cx);
                    max = max.max(cx);
                }
                x[v] = (min + max) * 0.5;
            }
        }
    }
    let num_tips = tip_rank as usize;
    let denom = if num_tips > 1 { (num_tips - 1) as f32 } else { 1.0 };
    for v in 0..n {
        if in_tree[v] {
            x[v] /= denom;
        }
    }

    // Time y is independent of traversal.
    let span = max_time - min_time;
    let y: Vec<f32> = nodes
        .time
        .iter()
        .map(|&t| if span > 0.0 { (max_time - t) / span } else { 0.0 })
        .collect();

    TreeGraph {
        tree_index,
        parent,
        children_index,
        children_data,
        time: nodes.time.clone(),
        x,
        y,
        in_tree,
        num_tips,
        roots,
    }
}

/// Mutations landing in `[left, right)`, placed on the edge above their
/// node: `x` at the node, `y` halfway to the parent (at the node for a
/// root). Mutations on nodes absent from this tree are skipped.
fn mutation_views(dataset: &Dataset, graph: &TreeGraph, left: f64, right: f64) -> Vec<ViewMutation> {
    dataset
        .mutations_in(left, right)
        .filter_map(|(row, node)| {
            let v = node as usize;
            if !graph.in_tree(v) {
                debug!(row, node, "mutation node absent from tree, skipping");
                return None;
            }
            let p = graph.parent(v);
            let y = if p == NULL_PARENT {
                graph.y(v)
            } else {
                (graph.y(v) + graph.y(p as usize)) * 0.5
            };
            Some(ViewMutation {
                x: graph.x(v),
                y,
                node,
            })
        })
        .collect()
}

/// Outcome of a batch construction: the wire buffer plus everything the
/// caller needs to maintain its session cache.
#[derive(Debug)]
pub struct BatchResult {
    /// Framed columnar buffer (see [`crate::graph::wire`]).
    pub buffer: Bytes,
    /// Global minimum node time.
    pub min_time: f32,
    /// Global maximum node time.
    pub max_time: f32,
    /// Tree indices actually produced, in request order.
    pub processed: Vec<usize>,
    /// Graphs built during this call (cache misses), for cache population.
    pub new_graphs: Vec<(usize, Arc<TreeGraph>)>,
}

/// Builds (or reuses from `cached`) every requested tree, optionally
/// sparsifies, and serializes the concatenated projections.
///
/// A failing index is skipped with a warning rather than aborting the
/// batch; `processed` reports what was actually produced. Purely
/// functional over its inputs.
pub fn construct_trees_batch(
    dataset: &Dataset,
    tree_indices: &[usize],
    sparsify_params: Option<&SparsifyParams>,
    cached: &HashMap<usize, Arc<TreeGraph>>,
) -> BatchResult {
    let (min_time, max_time) = dataset.time_range();
    let mut node_rows = NodeRows::default();
    let mut mutation_rows = MutationRows::default();
    let mut processed = Vec::with_capacity(tree_indices.len());
    let mut new_graphs = Vec::new();

    for &idx in tree_indices {
        let (left, right) = match dataset.tree_bounds(idx) {
            Ok(bounds) => bounds,
            Err(err) => {
                warn!(tree = idx, %err, "skipping tree in batch");
                continue;
            }
        };

        let graph = match cached.get(&idx) {
            Some(graph) => Arc::clone(graph),
            None => {
                let graph = Arc::new(build_tree(
                    &dataset.edges,
                    &dataset.nodes,
                    left,
                    min_time,
                    max_time,
                    idx,
                ));
                debug_assert!(graph.validate().is_ok());
                new_graphs.push((idx, Arc::clone(&graph)));
                graph
            }
        };

        let view = match sparsify_params {
            Some(params) => sparsify(&graph, params),
            None => SparseView::full(&graph),
        };
        let mutations = mutation_views(dataset, &graph, left, right);
        let mutations = match sparsify_params {
            Some(params) => sparsify_mutations(mutations, params, idx, &view.kept_ids()),
            None => mutations,
        };

        node_rows.push_view(&view, idx as i32);
        mutation_rows.push_tree(&mutations, idx as i32);
        processed.push(idx);
    }

    debug!(
        requested = tree_indices.len(),
        produced = processed.len(),
        nodes = node_rows.len(),
        mutations = mutation_rows.len(),
        "batch constructed"
    );

    BatchResult {
        buffer: encode_layout(&node_rows, &mutation_rows),
        min_time,
        max_time,
        processed,
        new_graphs,
    }
}
