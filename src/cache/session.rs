//! Per-session cache of constructed trees.
//!
//! Keeps the unsparsified graphs a session's last layout requests touched
//! so lineage queries never re-run construction. Eviction is primarily
//! visibility-driven: after each layout the caller reports which tree
//! indices are on screen and everything else is dropped. A TTL sweep
//! drops whole sessions that have gone idle, run opportunistically from
//! whichever operation happens to come in next.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::graph::TreeGraph;

struct CachedTree {
    graph: Arc<TreeGraph>,
    order: u64,
}

struct SessionEntry {
    trees: HashMap<usize, CachedTree>,
    last_access: Instant,
}

impl SessionEntry {
    fn new(now: Instant) -> SessionEntry {
        SessionEntry {
            trees: HashMap::new(),
            last_access: now,
        }
    }
}

struct Inner {
    sessions: HashMap<String, SessionEntry>,
    last_sweep: Instant,
    tick: u64,
}

/// Capacity- and time-bounded store of constructed trees keyed by
/// (session, tree index). One mutex guards the whole cache; every
/// operation is short.
pub struct SessionTreeCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    sweep_interval: Duration,
    max_trees_per_session: usize,
}

impl SessionTreeCache {
    /// Creates a cache with the given idle TTL, sweep cadence, and
    /// per-session tree bound.
    pub fn new(ttl: Duration, sweep_interval: Duration, max_trees_per_session: usize) -> Self {
        let now = Instant::now();
        SessionTreeCache {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                last_sweep: now,
                tick: 0,
            }),
            ttl,
            sweep_interval,
            max_trees_per_session: max_trees_per_session.max(1),
        }
    }

    /// Fetches a cached tree, refreshing its recency and the session's
    /// activity clock.
    pub fn get(&self, session: &str, tree_index: usize) -> Option<Arc<TreeGraph>> {
        let mut inner = self.inner.lock();
        self.sweep_if_due(&mut inner);
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.sessions.get_mut(session)?;
        entry.last_access = Instant::now();
        let cached = entry.trees.get_mut(&tree_index)?;
        cached.order = tick;
        Some(Arc::clone(&cached.graph))
    }

    /// Inserts one tree for a session.
    pub fn set(&self, session: &str, tree_index: usize, graph: Arc<TreeGraph>) {
        let mut inner = self.inner.lock();
        self.sweep_if_due(&mut inner);
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionEntry::new(Instant::now()));
        entry.last_access = Instant::now();
        entry.trees.insert(tree_index, CachedTree { graph, order: tick });
        Self::enforce_bound(entry, self.max_trees_per_session);
    }

    /// Inserts a batch of trees and drops everything outside the visible
    /// set, atomically under the cache mutex, so a concurrent lineage
    /// query never observes a half-applied layout response. Returns the
    /// number of indices that were not cached before.
    pub fn insert_and_evict(
        &self,
        session: &str,
        graphs: Vec<(usize, Arc<TreeGraph>)>,
        visible: &[usize],
    ) -> usize {
        let mut inner = self.inner.lock();
        self.sweep_if_due(&mut inner);
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionEntry::new(Instant::now()));
        entry.last_access = Instant::now();

        let mut newly = 0;
        for (tree_index, graph) in graphs {
            if entry
                .trees
                .insert(tree_index, CachedTree { graph, order: tick })
                .is_none()
            {
                newly += 1;
            }
        }
        let before = entry.trees.len();
        entry.trees.retain(|idx, _| visible.contains(idx));
        let evicted = before - entry.trees.len();
        Self::enforce_bound(entry, self.max_trees_per_session);
        debug!(session, newly, evicted, "session cache updated");
        newly
    }

    /// Drops cached trees outside the visible set for a session.
    pub fn evict_not_visible(&self, session: &str, visible: &[usize]) {
        self.insert_and_evict(session, Vec::new(), visible);
    }

    /// Cached tree indices for a session, ascending.
    pub fn get_all_for_session(&self, session: &str) -> Vec<usize> {
        let inner = self.inner.lock();
        let mut indices: Vec<usize> = inner
            .sessions
            .get(session)
            .map(|entry| entry.trees.keys().copied().collect())
            .unwrap_or_default();
        indices.sort_unstable();
        indices
    }

    /// Drops a session entirely; called when it switches datasets.
    pub fn clear_session(&self, session: &str) {
        let mut inner = self.inner.lock();
        inner.sessions.remove(session);
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    fn enforce_bound(entry: &mut SessionEntry, bound: usize) {
        while entry.trees.len() > bound {
            let oldest = entry
                .trees
                .iter()
                .min_by_key(|(_, cached)| cached.order)
                .map(|(&idx, _)| idx);
            match oldest {
                Some(idx) => {
                    entry.trees.remove(&idx);
                }
                None => break,
            }
        }
    }

    fn sweep_if_due(&self, inner: &mut Inner) {
        if inner.last_sweep.elapsed() < self.sweep_interval {
            return;
        }
        inner.last_sweep = Instant::now();
        let ttl = self.ttl;
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, entry| entry.last_access.elapsed() < ttl);
        let dropped = before - inner.sessions.len();
        if dropped > 0 {
            debug!(dropped, "idle sessions swept");
        }
    }
}
