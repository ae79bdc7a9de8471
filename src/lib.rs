//! Arbor: a layout and serving engine for tree sequence datasets.
//!
//! Turns tabular ancestral-recombination-graph data (interval-scoped
//! edges, per-node times) into renderable trees with normalized
//! coordinates, sparsifies them for large-N display, serializes them to a
//! compact columnar wire format, and keeps per-session and per-file
//! caches so interactive panning, zooming, and lineage queries stay
//! cheap under concurrency.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod lineage;
pub mod service;
pub mod telemetry;

pub use config::Config;
pub use error::{LayoutError, Result};
pub use service::{LayoutRequest, LayoutResponse, LayoutService};
