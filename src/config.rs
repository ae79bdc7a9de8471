//! Process-level configuration.

use std::time::Duration;

/// Tunables for the layout engine and its caches.
///
/// Constructed once at process start and handed to [`crate::service::LayoutService`];
/// none of the fields are consulted through globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sparsification grid cell edge in normalized layout units. The grid
    /// resolution is `1.0 / sparsify_cell`.
    pub sparsify_cell: f32,
    /// Multiplier applied to the base resolution inside an adaptive
    /// viewport. Clamped to at least 1.0 so in-box density never regresses
    /// below uniform mode.
    pub adaptive_inside_multiplier: f32,
    /// Viewport area fraction below which in-box deduplication is disabled
    /// entirely (everything inside the box is kept).
    pub low_coverage_fraction: f32,
    /// Collapse unary internal chains during sparsification.
    pub collapse_unary: bool,
    /// Idle duration after which an entire session is dropped from the
    /// session tree cache.
    pub session_ttl: Duration,
    /// Minimum interval between opportunistic TTL sweeps.
    pub sweep_interval: Duration,
    /// Soft bound on cached trees per session; least-recently-used entries
    /// beyond it are evicted on insert.
    pub max_trees_per_session: usize,
    /// Resident dataset count in the file cache.
    pub file_cache_capacity: usize,
    /// How long a caller waits on a per-path load lock before failing with
    /// a lock timeout.
    pub load_lock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sparsify_cell: 2.0e-5,
            adaptive_inside_multiplier: 4.0,
            low_coverage_fraction: 0.02,
            collapse_unary: true,
            session_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            max_trees_per_session: 512,
            file_cache_capacity: 2,
            load_lock_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Settings for memory-constrained deployments: one resident dataset,
    /// shorter session lifetime.
    pub fn low_memory() -> Self {
        Self {
            session_ttl: Duration::from_secs(600),
            max_trees_per_session: 64,
            file_cache_capacity: 1,
            ..Self::default()
        }
    }

    /// Settings for multi-dataset serving on large hosts.
    pub fn high_capacity() -> Self {
        Self {
            max_trees_per_session: 2048,
            file_cache_capacity: 5,
            ..Self::default()
        }
    }

    /// Grid resolution derived from the configured cell size.
    pub fn resolution(&self) -> f32 {
        1.0 / self.sparsify_cell
    }
}
