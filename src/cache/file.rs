//! Per-dataset-path cache with single-flight loading.
//!
//! Datasets are large, so at most a handful stay resident (LRU by count).
//! Every access revalidates against the file's modification time; a
//! mismatch is treated as a cold miss and the context is replaced
//! wholesale, never patched. Concurrent loads of the same path collapse
//! into one parse behind a lazily created per-path async lock; loads of
//! distinct paths never serialize on each other.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::dataset::{Dataset, DatasetLoader, MetaValue, Summary};
use crate::error::{inconsistent, LayoutError, Result};

/// One opened dataset plus everything derived from it at load time.
/// Replaced wholesale when the underlying file changes.
pub struct FileContext {
    /// The parsed dataset tables.
    pub dataset: Dataset,
    /// Derived summary (genome length, sample catalogue, time range).
    pub summary: Summary,
    mtime: SystemTime,
    meta_cache: Mutex<FxHashMap<String, Arc<Vec<Option<MetaValue>>>>>,
}

impl FileContext {
    fn load(loader: &dyn DatasetLoader, path: &Path, mtime: SystemTime) -> Result<FileContext> {
        let dataset = loader.load(path)?;
        let summary = Summary::derive(&dataset);
        Ok(FileContext {
            dataset,
            summary,
            mtime,
            meta_cache: Mutex::new(FxHashMap::default()),
        })
    }

    /// Modification time of the source file when this context was loaded.
    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    /// Per-node values for one metadata key, decoded on first request and
    /// cached for the context's lifetime.
    pub fn node_metadata(&self, key: &str) -> Result<Arc<Vec<Option<MetaValue>>>> {
        if let Some(column) = self.meta_cache.lock().get(key) {
            return Ok(Arc::clone(column));
        }
        let mut column = Vec::with_capacity(self.dataset.nodes.len());
        for blob in &self.dataset.nodes.metadata {
            let value = match blob {
                Some(raw) => MetaValue::decode(raw)?.get(key).cloned(),
                None => None,
            };
            column.push(value);
        }
        let column = Arc::new(column);
        self.meta_cache
            .lock()
            .insert(key.to_string(), Arc::clone(&column));
        Ok(column)
    }
}

/// Global path-keyed cache of opened datasets.
pub struct FileCache {
    entries: Mutex<LruCache<PathBuf, Arc<FileContext>>>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    loader: Arc<dyn DatasetLoader>,
    lock_timeout: Duration,
}

impl FileCache {
    /// Creates a cache holding at most `capacity` resident datasets.
    pub fn new(loader: Arc<dyn DatasetLoader>, capacity: usize, lock_timeout: Duration) -> Self {
        FileCache {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN),
            )),
            locks: Mutex::new(HashMap::new()),
            loader,
            lock_timeout,
        }
    }

    /// Returns the context for `path`, loading or reloading as needed.
    ///
    /// A lock timeout is retried once before surfacing; all other errors
    /// leave the path uncached so a later call can retry.
    pub async fn get(&self, path: &Path) -> Result<Arc<FileContext>> {
        let mtime = stat_mtime(path)?;

        // Optimistic fast path.
        if let Some(ctx) = self.entries.lock().get(path) {
            if ctx.mtime == mtime {
                return Ok(Arc::clone(ctx));
            }
            debug!(path = %path.display(), "dataset changed on disk, reloading");
        }

        match self.load_slow(path).await {
            Err(err) if err.is_transient() => {
                warn!(path = %path.display(), %err, "load lock timed out, retrying once");
                self.load_slow(path).await
            }
            other => other,
        }
    }

    /// Drops a cached context, if present.
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().pop(path);
    }

    /// Number of resident datasets.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no datasets are resident.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    async fn load_slow(&self, path: &Path) -> Result<Arc<FileContext>> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = tokio::time::timeout(self.lock_timeout, lock.lock())
            .await
            .map_err(|_| LayoutError::LockTimeout(path.to_path_buf()))?;

        // Double-checked: another caller may have finished the load while
        // we waited, and the file may have changed again in the meantime.
        let mtime = stat_mtime(path)?;
        if let Some(ctx) = self.entries.lock().get(path) {
            if ctx.mtime == mtime {
                return Ok(Arc::clone(ctx));
            }
        }

        let loader = Arc::clone(&self.loader);
        let owned = path.to_path_buf();
        let ctx = tokio::task::spawn_blocking(move || {
            FileContext::load(loader.as_ref(), &owned, mtime)
        })
        .await
        .map_err(|e| inconsistent(format!("dataset load task panicked: {e}")))??;

        let ctx = Arc::new(ctx);
        self.entries.lock().put(path.to_path_buf(), Arc::clone(&ctx));
        debug!(path = %path.display(), nodes = ctx.summary.num_nodes, "dataset cached");
        Ok(ctx)
    }
}

fn stat_mtime(path: &Path) -> Result<SystemTime> {
    let meta = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LayoutError::NotFound(path.to_path_buf()),
        _ => LayoutError::Io(e),
    })?;
    meta.modified().map_err(LayoutError::Io)
}
