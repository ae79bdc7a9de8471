//! Grid-based sparsification of constructed trees.
//!
//! Bounds the number of edges shipped to the client by keeping at most one
//! edge per occupied cell of a fixed-resolution grid over the normalized
//! layout plane, then re-linking kept nodes so the result is always a valid
//! subtree. Deduplication is first-writer-wins in ascending node-id order,
//! which is deterministic for a fixed construction order.

use rustc_hash::FxHashSet;

use super::tree::{TreeGraph, NULL_PARENT};
use crate::config::Config;

/// Sparsification controls for one layout request.
#[derive(Debug, Clone)]
pub struct SparsifyParams {
    /// Base (outside) grid resolution: cells per unit of layout space.
    pub resolution: f32,
    /// Resolution multiplier inside the viewport; clamped to at least 1.0
    /// so in-box density never regresses below uniform mode.
    pub inside_multiplier: f32,
    /// Viewport area fraction below which in-box dedup is disabled.
    pub low_coverage_fraction: f32,
    /// Collapse unary internal chains after deduplication.
    pub collapse_unary: bool,
    /// Focused viewport for adaptive mode, if any.
    pub viewport: Option<ViewportParams>,
}

/// Caller-supplied viewport for adaptive sparsification, in normalized
/// layout coordinates, scoped to a single target tree.
#[derive(Debug, Clone, Copy)]
pub struct ViewportParams {
    /// Tree the viewport applies to; other trees in the same batch use
    /// uniform mode.
    pub tree_index: usize,
    /// Left edge of the box.
    pub x0: f32,
    /// Right edge of the box.
    pub x1: f32,
    /// Bottom edge of the box.
    pub y0: f32,
    /// Top edge of the box.
    pub y1: f32,
}

impl SparsifyParams {
    /// Uniform-mode parameters at `resolution`, no viewport.
    pub fn uniform(resolution: f32) -> SparsifyParams {
        SparsifyParams {
            resolution,
            inside_multiplier: 1.0,
            low_coverage_fraction: 0.0,
            collapse_unary: true,
            viewport: None,
        }
    }

    /// Parameters derived from process configuration plus an optional
    /// request viewport.
    pub fn from_config(config: &Config, viewport: Option<ViewportParams>) -> SparsifyParams {
        SparsifyParams {
            resolution: config.resolution(),
            inside_multiplier: config.adaptive_inside_multiplier,
            low_coverage_fraction: config.low_coverage_fraction,
            collapse_unary: config.collapse_unary,
            viewport,
        }
    }
}

/// One node row of a sparsified (or full) projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewNode {
    /// Global node id.
    pub id: i32,
    /// Parent id after any unary-collapse re-pointing, or -1.
    pub parent: i32,
    /// Tip status for rendering; see the collapse tie-break below.
    pub is_tip: bool,
    /// Layout coordinate.
    pub x: f32,
    /// Time coordinate.
    pub y: f32,
}

/// One mutation row of a projection, placed on the edge above its node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMutation {
    /// Layout coordinate.
    pub x: f32,
    /// Time coordinate.
    pub y: f32,
    /// Node the mutation is attached to.
    pub node: i32,
}

/// Transient per-request projection of a tree; never replaces or mutates
/// the underlying [`TreeGraph`].
#[derive(Debug, Clone, Default)]
pub struct SparseView {
    /// Kept nodes in ascending id order.
    pub nodes: Vec<ViewNode>,
}

impl SparseView {
    /// Projection of the whole tree with no reduction.
    pub fn full(graph: &TreeGraph) -> SparseView {
        let nodes = graph
            .members()
            .map(|v| ViewNode {
                id: v as i32,
                parent: graph.parent(v),
                is_tip: graph.is_tip(v),
                x: graph.x(v),
                y: graph.y(v),
            })
            .collect();
        SparseView { nodes }
    }

    /// Ids of the kept nodes.
    pub fn kept_ids(&self) -> FxHashSet<i32> {
        self.nodes.iter().map(|n| n.id).collect()
    }
}

#[derive(Clone, Copy)]
struct InsideZone {
    x0: f32,
    x1: f32,
    y0: f32,
    y1: f32,
    resolution: f32,
    keep_all: bool,
}

/// First-writer-wins cell admission over one or two grid zones. Node and
/// mutation passes use separate instances so their cells never collide.
struct GridDedup {
    outside_resolution: f32,
    inside: Option<InsideZone>,
    outside_cells: FxHashSet<(i64, i64)>,
    inside_cells: FxHashSet<(i64, i64)>,
}

impl GridDedup {
    fn new(params: &SparsifyParams, tree_index: usize) -> GridDedup {
        let inside = params.viewport.filter(|vp| vp.tree_index == tree_index).map(|vp| {
            let area = (vp.x1 - vp.x0).max(0.0) * (vp.y1 - vp.y0).max(0.0);
            InsideZone {
                x0: vp.x0,
                x1: vp.x1,
                y0: vp.y0,
                y1: vp.y1,
                resolution: params.resolution * params.inside_multiplier.max(1.0),
                keep_all: area < params.low_coverage_fraction,
            }
        });
        GridDedup {
            outside_resolution: params.resolution,
            inside,
            outside_cells: FxHashSet::default(),
            inside_cells: FxHashSet::default(),
        }
    }

    fn admit(&mut self, x: f32, y: f32) -> bool {
        if let Some(zone) = self.inside {
            if x >= zone.x0 && x <= zone.x1 && y >= zone.y0 && y <= zone.y1 {
                if zone.keep_all {
                    return true;
                }
                let cell = quantize(x, y, zone.resolution);
                return self.inside_cells.insert(cell);
            }
        }
        let cell = quantize(x, y, self.outside_resolution);
        self.outside_cells.insert(cell)
    }
}

fn quantize(x: f32, y: f32, resolution: f32) -> (i64, i64) {
    ((x * resolution).floor() as i64, (y * resolution).floor() as i64)
}

/// Reduces `graph` to a connected subset of nodes dense enough for the
/// requested grid resolution.
pub fn sparsify(graph: &TreeGraph, params: &SparsifyParams) -> SparseView {
    let n = graph.num_nodes();
    let mut keep = vec![false; n];
    let mut grid = GridDedup::new(params, graph.tree_index());

    for v in 0..n {
        if !graph.in_tree(v) {
            continue;
        }
        let p = graph.parent(v);
        if p == NULL_PARENT {
            // Roots are always kept.
            keep[v] = true;
            continue;
        }
        let p = p as usize;
        let mx = (graph.x(v) + graph.x(p)) * 0.5;
        let my = (graph.y(v) + graph.y(p)) * 0.5;
        if grid.admit(mx, my) {
            keep[v] = true;
        }
    }

    // Re-establish connectivity: pull in skipped ancestors of every kept
    // node, stopping at the first already-kept one. Afterward the parent of
    // any kept node is itself kept (or a root).
    for v in 0..n {
        if !keep[v] {
            continue;
        }
        let mut p = graph.parent(v);
        while p != NULL_PARENT && !keep[p as usize] {
            keep[p as usize] = true;
            p = graph.parent(p as usize);
        }
    }

    if params.collapse_unary {
        collapsed_view(graph, &keep)
    } else {
        plain_view(graph, &keep)
    }
}

fn plain_view(graph: &TreeGraph, keep: &[bool]) -> SparseView {
    let nodes = (0..keep.len())
        .filter(|&v| keep[v])
        .map(|v| ViewNode {
            id: v as i32,
            parent: graph.parent(v),
            is_tip: graph.is_tip(v),
            x: graph.x(v),
            y: graph.y(v),
        })
        .collect();
    SparseView { nodes }
}

/// Drops kept non-root nodes with exactly one retained child, re-pointing
/// each survivor to its nearest surviving ancestor.
///
/// Tip status is the node's original tip flag intersected with its
/// post-collapse child count; it is never inferred from post-collapse
/// adjacency alone, so internal nodes whose children were all dropped do
/// not become tips.
fn collapsed_view(graph: &TreeGraph, keep: &[bool]) -> SparseView {
    let n = keep.len();
    let mut kept_children = vec![0u32; n];
    for v in 0..n {
        if !keep[v] {
            continue;
        }
        let p = graph.parent(v);
        if p != NULL_PARENT {
            kept_children[p as usize] += 1;
        }
    }

    let mut collapsible = vec![false; n];
    for v in 0..n {
        collapsible[v] =
            keep[v] && graph.parent(v) != NULL_PARENT && kept_children[v] == 1 && !graph.is_tip(v);
    }

    let survives = |v: usize| keep[v] && !collapsible[v];

    let mut post_children = vec![0u32; n];
    let mut reparented = vec![NULL_PARENT; n];
    for v in 0..n {
        if !survives(v) {
            continue;
        }
        let mut p = graph.parent(v);
        while p != NULL_PARENT && collapsible[p as usize] {
            p = graph.parent(p as usize);
        }
        reparented[v] = p;
        if p != NULL_PARENT {
            post_children[p as usize] += 1;
        }
    }

    let nodes = (0..n)
        .filter(|&v| survives(v))
        .map(|v| ViewNode {
            id: v as i32,
            parent: reparented[v],
            is_tip: graph.is_tip(v) && post_children[v] == 0,
            x: graph.x(v),
            y: graph.y(v),
        })
        .collect();
    SparseView { nodes }
}

/// Grid-deduplicates one tree's mutations with the same zoning rules as
/// the node pass, dropping any mutation whose node was not kept.
///
/// Kept mutations referencing dropped nodes would be orphaned on the
/// client, so the membership filter runs before cell admission.
pub fn sparsify_mutations(
    mutations: Vec<ViewMutation>,
    params: &SparsifyParams,
    tree_index: usize,
    kept_nodes: &FxHashSet<i32>,
) -> Vec<ViewMutation> {
    let mut grid = GridDedup::new(params, tree_index);
    mutations
        .into_iter()
        .filter(|m| kept_nodes.contains(&m.node) && grid.admit(m.x, m.y))
        .collect()
}
