//! Crate-wide error taxonomy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Error taxonomy for the layout engine and its caches.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Underlying filesystem failure while stating or reading a dataset.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Tree index outside `0..num_trees`. Caller bug, never retried.
    #[error("tree index {0} out of range")]
    InvalidIndex(usize),
    /// Node id outside the node table or not a member of the queried tree.
    #[error("node id {0} out of range or not in tree")]
    InvalidNode(i32),
    /// Lineage query against a tree the session has not cached. Recoverable
    /// by re-running a layout request.
    #[error("tree {tree} not cached for session {session}")]
    NotCached {
        /// Opaque session key the query was scoped to.
        session: String,
        /// Tree index that was missing.
        tree: usize,
    },
    /// Dataset path does not exist.
    #[error("dataset not found: {0}")]
    NotFound(PathBuf),
    /// Dataset exists but failed to parse or validate.
    #[error("dataset failed to load: {0}")]
    LoadError(String),
    /// Per-path load lock could not be acquired in time. Transient.
    #[error("timed out waiting for load lock on {0}")]
    LockTimeout(PathBuf),
    /// Internal invariant violation. Fatal; never silently swallowed.
    #[error("internal invariant violated: {0}")]
    Inconsistent(String),
}

impl LayoutError {
    /// True for errors a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, LayoutError::LockTimeout(_))
    }
}

pub(crate) fn inconsistent(msg: impl Into<String>) -> LayoutError {
    let msg = msg.into();
    error!("invariant violation: {msg}");
    LayoutError::Inconsistent(msg)
}
