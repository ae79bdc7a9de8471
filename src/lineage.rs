//! Read-only lineage queries over cached trees.
//!
//! Every operation here takes an already-constructed [`TreeGraph`].
//! Resolving (session, tree index) to a graph, and failing with
//! `NotCached` when it is absent, is the service layer's job, so a miss
//! can never silently trigger reconstruction.

use std::collections::{HashSet, VecDeque};

use crate::error::{LayoutError, Result};
use crate::graph::{TreeGraph, NULL_PARENT};

/// Filter for [`search`]. All populated constraints must hold.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// Inclusive lower bound on node time.
    pub min_time: Option<f32>,
    /// Inclusive upper bound on node time.
    pub max_time: Option<f32>,
    /// Match tips only.
    pub tips_only: bool,
    /// Match internal (non-tip) nodes only.
    pub internal_only: bool,
    /// Explicit id allow-list.
    pub ids: Option<Vec<i32>>,
}

/// One search hit with its render coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMatch {
    /// Node id.
    pub id: i32,
    /// Layout coordinate.
    pub x: f32,
    /// Time coordinate.
    pub y: f32,
    /// Raw node time.
    pub time: f32,
    /// Tip status.
    pub is_tip: bool,
}

/// Node/edge set of a subtree.
#[derive(Debug, Clone, Default)]
pub struct Subtree {
    /// Nodes in breadth-first discovery order, starting at the root.
    pub nodes: Vec<i32>,
    /// `(parent, child)` pairs within the subtree.
    pub edges: Vec<(i32, i32)>,
}

fn check_node(graph: &TreeGraph, node: i32) -> Result<usize> {
    let v = usize::try_from(node).map_err(|_| LayoutError::InvalidNode(node))?;
    if v >= graph.num_nodes() || !graph.in_tree(v) {
        return Err(LayoutError::InvalidNode(node));
    }
    Ok(v)
}

/// Path from `node` to its root, inclusive on both ends.
pub fn ancestors(graph: &TreeGraph, node: i32) -> Result<Vec<i32>> {
    let mut v = check_node(graph, node)?;
    let mut path = vec![node];
    loop {
        let p = graph.parent(v);
        if p == NULL_PARENT {
            break;
        }
        path.push(p);
        v = p as usize;
    }
    Ok(path)
}

/// All nodes reachable downward from `node`, breadth-first, excluding
/// `node` itself. With `tips_only`, internal descendants are traversed
/// but not reported.
pub fn descendants(graph: &TreeGraph, node: i32, tips_only: bool) -> Result<Vec<i32>> {
    let start = check_node(graph, node)?;
    let mut out = Vec::new();
    let mut queue: VecDeque<usize> = graph.children(start).iter().map(|&c| c as usize).collect();
    while let Some(v) = queue.pop_front() {
        if !tips_only || graph.is_tip(v) {
            out.push(v as i32);
        }
        queue.extend(graph.children(v).iter().map(|&c| c as usize));
    }
    Ok(out)
}

/// Full node/edge set of the subtree rooted at `root`, breadth-first.
/// Cycle-safe: a node is visited at most once even if the underlying
/// arrays are corrupt.
pub fn subtree(graph: &TreeGraph, root: i32) -> Result<Subtree> {
    let start = check_node(graph, root)?;
    let mut result = Subtree::default();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    visited.insert(start);
    while let Some(v) = queue.pop_front() {
        result.nodes.push(v as i32);
        for &c in graph.children(v) {
            if visited.insert(c as usize) {
                result.edges.push((v as i32, c));
                queue.push_back(c as usize);
            }
        }
    }
    Ok(result)
}

/// Most recent common ancestor of `nodes`: the member of the intersected
/// ancestor sets closest to the present (smallest time; node times are
/// ages). `Ok(None)` when the nodes share no ancestor, which is an
/// expected outcome in a multi-root tree, not an error.
pub fn mrca(graph: &TreeGraph, nodes: &[i32]) -> Result<Option<i32>> {
    let mut iter = nodes.iter();
    let first = match iter.next() {
        Some(&n) => n,
        None => return Ok(None),
    };
    let mut common: HashSet<i32> = ancestors(graph, first)?.into_iter().collect();
    for &node in iter {
        let set: HashSet<i32> = ancestors(graph, node)?.into_iter().collect();
        common.retain(|v| set.contains(v));
        if common.is_empty() {
            return Ok(None);
        }
    }
    Ok(common
        .into_iter()
        .min_by(|&a, &b| {
            graph
                .time(a as usize)
                .total_cmp(&graph.time(b as usize))
        }))
}

/// Linear scan over in-tree nodes applying `criteria`.
pub fn search(graph: &TreeGraph, criteria: &SearchCriteria) -> Result<Vec<NodeMatch>> {
    let allow: Option<HashSet<i32>> = criteria.ids.as_ref().map(|ids| ids.iter().copied().collect());
    let mut out = Vec::new();
    for v in graph.members() {
        let id = v as i32;
        if let Some(allow) = &allow {
            if !allow.contains(&id) {
                continue;
            }
        }
        let time = graph.time(v);
        if criteria.min_time.is_some_and(|t| time < t) {
            continue;
        }
        if criteria.max_time.is_some_and(|t| time > t) {
            continue;
        }
        let is_tip = graph.is_tip(v);
        if criteria.tips_only && !is_tip {
            continue;
        }
        if criteria.internal_only && is_tip {
            continue;
        }
        out.push(NodeMatch {
            id,
            x: graph.x(v),
            y: graph.y(v),
            time,
            is_tip,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, EdgeTable, MutationTable, NodeTable};
    use crate::graph::construct_tree;

    /// Two-root forest:
    ///   0 -> {1, 2}, 1 -> {3, 4}   and   5 -> {6}
    fn forest() -> TreeGraph {
        let edges = [(0, 1), (0, 2), (1, 3), (1, 4), (5, 6)];
        let ds = Dataset::new(
            EdgeTable {
                left: vec![0.0; edges.len()],
                right: vec![1.0; edges.len()],
                parent: edges.iter().map(|e| e.0).collect(),
                child: edges.iter().map(|e| e.1).collect(),
            },
            NodeTable {
                time: vec![10.0, 5.0, 0.0, 0.0, 0.0, 8.0, 0.0],
                flags: vec![0; 7],
                metadata: vec![None; 7],
            },
            MutationTable::default(),
            vec![0.0, 1.0],
        )
        .expect("dataset");
        construct_tree(&ds, 0).expect("construct")
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let graph = forest();
        assert_eq!(ancestors(&graph, 3).expect("ancestors"), vec![3, 1, 0]);
        assert_eq!(ancestors(&graph, 0).expect("ancestors"), vec![0]);
    }

    #[test]
    fn ancestors_reject_bad_node_ids() {
        let graph = forest();
        assert!(matches!(
            ancestors(&graph, 99),
            Err(LayoutError::InvalidNode(99))
        ));
        assert!(matches!(
            ancestors(&graph, -2),
            Err(LayoutError::InvalidNode(-2))
        ));
    }

    #[test]
    fn descendants_breadth_first_with_tip_filter() {
        let graph = forest();
        assert_eq!(descendants(&graph, 0, false).expect("descendants"), vec![1, 2, 3, 4]);
        assert_eq!(descendants(&graph, 0, true).expect("descendants"), vec![2, 3, 4]);
        assert!(descendants(&graph, 3, false).expect("descendants").is_empty());
    }

    #[test]
    fn subtree_collects_nodes_and_edges() {
        let graph = forest();
        let sub = subtree(&graph, 1).expect("subtree");
        assert_eq!(sub.nodes, vec![1, 3, 4]);
        assert_eq!(sub.edges, vec![(1, 3), (1, 4)]);
    }

    #[test]
    fn mrca_picks_the_youngest_common_ancestor() {
        let graph = forest();
        assert_eq!(mrca(&graph, &[3, 4]).expect("mrca"), Some(1));
        assert_eq!(mrca(&graph, &[3, 2]).expect("mrca"), Some(0));
        assert_eq!(mrca(&graph, &[3, 1]).expect("mrca"), Some(1));
    }

    #[test]
    fn mrca_without_common_ancestor_is_none_not_an_error() {
        let graph = forest();
        assert_eq!(mrca(&graph, &[3, 6]).expect("mrca"), None);
        assert_eq!(mrca(&graph, &[]).expect("mrca"), None);
    }

    #[test]
    fn repeated_queries_are_idempotent() {
        let graph = forest();
        let first = ancestors(&graph, 4).expect("ancestors");
        let second = ancestors(&graph, 4).expect("ancestors");
        assert_eq!(first, second);
    }

    #[test]
    fn search_filters_compose() {
        let graph = forest();
        let tips = search(
            &graph,
            &SearchCriteria {
                tips_only: true,
                ..SearchCriteria::default()
            },
        )
        .expect("search");
        let ids: Vec<i32> = tips.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 6]);

        let old = search(
            &graph,
            &SearchCriteria {
                min_time: Some(6.0),
                ..SearchCriteria::default()
            },
        )
        .expect("search");
        let ids: Vec<i32> = old.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 5]);

        let listed = search(
            &graph,
            &SearchCriteria {
                ids: Some(vec![1, 6, 99]),
                ..SearchCriteria::default()
            },
        )
        .expect("search");
        let ids: Vec<i32> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 6]);
    }
}
