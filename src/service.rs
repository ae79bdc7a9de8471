//! Transport-facing entry points.
//!
//! The event loop stays cooperative: anything CPU-bound (construction,
//! sparsification, serialization) runs on the blocking worker pool and is
//! awaited back. Lineage queries are cheap pointer walks over cached
//! graphs and run inline. A disconnected client does not cancel in-flight
//! construction; a populated cache entry is useful to whoever asks next.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::cache::{FileCache, SessionTreeCache};
use crate::config::Config;
use crate::dataset::DatasetLoader;
use crate::error::{inconsistent, LayoutError, Result};
use crate::graph::{
    construct_tree, construct_trees_batch, SparsifyParams, TreeGraph, ViewportParams,
};
use crate::lineage::{self, NodeMatch, SearchCriteria, Subtree};

/// One layout request from the transport layer.
#[derive(Debug, Clone)]
pub struct LayoutRequest {
    /// Dataset path (resolved to a local file by the storage layer).
    pub dataset: PathBuf,
    /// Opaque session key.
    pub session: String,
    /// Requested tree indices.
    pub tree_indices: Vec<usize>,
    /// Whether to sparsify the projections.
    pub sparsify: bool,
    /// Focused viewport for adaptive sparsification.
    pub viewport: Option<ViewportParams>,
}

/// Layout response: the wire buffer plus what was actually produced.
#[derive(Debug)]
pub struct LayoutResponse {
    /// Framed columnar buffer.
    pub buffer: Bytes,
    /// Tree indices present in the buffer, in request order.
    pub processed: Vec<usize>,
    /// Global minimum node time.
    pub min_time: f32,
    /// Global maximum node time.
    pub max_time: f32,
}

/// The core engine handle: one per process, shared behind `Arc` by every
/// connection handler.
pub struct LayoutService {
    config: Config,
    files: Arc<FileCache>,
    sessions: Arc<SessionTreeCache>,
}

impl LayoutService {
    /// Builds a service from configuration and a dataset loader.
    pub fn new(config: Config, loader: Arc<dyn DatasetLoader>) -> LayoutService {
        let files = Arc::new(FileCache::new(
            loader,
            config.file_cache_capacity,
            config.load_lock_timeout,
        ));
        let sessions = Arc::new(SessionTreeCache::new(
            config.session_ttl,
            config.sweep_interval,
            config.max_trees_per_session,
        ));
        LayoutService {
            config,
            files,
            sessions,
        }
    }

    /// The file cache, exposed for eviction hooks and tests.
    pub fn file_cache(&self) -> &Arc<FileCache> {
        &self.files
    }

    /// The session cache, exposed for tests.
    pub fn session_cache(&self) -> &Arc<SessionTreeCache> {
        &self.sessions
    }

    /// Produces the wire buffer for a set of trees, reusing any graphs the
    /// session already has cached and retaining the (unsparsified) graphs
    /// built along the way for later lineage queries.
    pub async fn layout(&self, req: LayoutRequest) -> Result<LayoutResponse> {
        let ctx = self.files.get(&req.dataset).await?;

        let mut cached: HashMap<usize, Arc<TreeGraph>> = HashMap::new();
        for &idx in &req.tree_indices {
            if let Some(graph) = self.sessions.get(&req.session, idx) {
                cached.insert(idx, graph);
            }
        }
        debug!(
            session = %req.session,
            requested = req.tree_indices.len(),
            hits = cached.len(),
            "layout request"
        );

        let params = req
            .sparsify
            .then(|| SparsifyParams::from_config(&self.config, req.viewport));
        let indices = req.tree_indices.clone();
        let result = tokio::task::spawn_blocking(move || {
            construct_trees_batch(&ctx.dataset, &indices, params.as_ref(), &cached)
        })
        .await
        .map_err(|e| inconsistent(format!("layout task panicked: {e}")))?;

        for (idx, graph) in &result.new_graphs {
            self.sessions.set(&req.session, *idx, Arc::clone(graph));
        }

        Ok(LayoutResponse {
            buffer: result.buffer,
            processed: result.processed,
            min_time: result.min_time,
            max_time: result.max_time,
        })
    }

    /// Ensures every visible tree is cached for the session and drops the
    /// rest, atomically. Returns how many trees were newly cached.
    pub async fn cache_visible(
        &self,
        dataset: &std::path::Path,
        session: &str,
        visible: Vec<usize>,
    ) -> Result<usize> {
        let ctx = self.files.get(dataset).await?;

        let missing: Vec<usize> = visible
            .iter()
            .copied()
            .filter(|&idx| self.sessions.get(session, idx).is_none())
            .collect();

        let built = if missing.is_empty() {
            Vec::new()
        } else {
            tokio::task::spawn_blocking(move || {
                let mut built = Vec::with_capacity(missing.len());
                for idx in missing {
                    match construct_tree(&ctx.dataset, idx) {
                        Ok(graph) => built.push((idx, Arc::new(graph))),
                        Err(err) => {
                            tracing::warn!(tree = idx, %err, "skipping uncacheable tree");
                        }
                    }
                }
                built
            })
            .await
            .map_err(|e| inconsistent(format!("cache task panicked: {e}")))?
        };

        Ok(self.sessions.insert_and_evict(session, built, &visible))
    }

    /// Forgets everything cached for a session; called when it switches to
    /// a different dataset.
    pub fn clear_session(&self, session: &str) {
        self.sessions.clear_session(session);
    }

    /// Path from a node to its root in a cached tree.
    pub fn ancestors(&self, session: &str, tree_index: usize, node: i32) -> Result<Vec<i32>> {
        let graph = self.cached_graph(session, tree_index)?;
        lineage::ancestors(&graph, node)
    }

    /// Descendants of a node in a cached tree, optionally tips only.
    pub fn descendants(
        &self,
        session: &str,
        tree_index: usize,
        node: i32,
        tips_only: bool,
    ) -> Result<Vec<i32>> {
        let graph = self.cached_graph(session, tree_index)?;
        lineage::descendants(&graph, node, tips_only)
    }

    /// Subtree rooted at a node in a cached tree.
    pub fn subtree(&self, session: &str, tree_index: usize, root: i32) -> Result<Subtree> {
        let graph = self.cached_graph(session, tree_index)?;
        lineage::subtree(&graph, root)
    }

    /// Most recent common ancestor of a node set in a cached tree;
    /// `Ok(None)` when they share none.
    pub fn mrca(&self, session: &str, tree_index: usize, nodes: &[i32]) -> Result<Option<i32>> {
        let graph = self.cached_graph(session, tree_index)?;
        lineage::mrca(&graph, nodes)
    }

    /// Criteria search over a cached tree.
    pub fn search(
        &self,
        session: &str,
        tree_index: usize,
        criteria: &SearchCriteria,
    ) -> Result<Vec<NodeMatch>> {
        let graph = self.cached_graph(session, tree_index)?;
        lineage::search(&graph, criteria)
    }

    fn cached_graph(&self, session: &str, tree_index: usize) -> Result<Arc<TreeGraph>> {
        self.sessions
            .get(session, tree_index)
            .ok_or_else(|| LayoutError::NotCached {
                session: session.to_string(),
                tree: tree_index,
            })
    }
}
