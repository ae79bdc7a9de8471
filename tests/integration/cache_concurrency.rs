use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use arbor::cache::FileCache;
use arbor::dataset::{Dataset, DatasetLoader, JsonDatasetLoader};
use arbor::{LayoutError, Result};
use tempfile::NamedTempFile;

fn write_dataset(num_extra_nodes: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    write_dataset_to(&mut file, num_extra_nodes);
    file
}

fn write_dataset_to(file: &mut NamedTempFile, num_extra_nodes: usize) {
    use std::io::Seek;

    let mut times = vec![10.0, 0.0, 0.0];
    times.extend(std::iter::repeat(0.0).take(num_extra_nodes));
    let times = serde_json::to_string(&times).expect("times json");
    let body = format!(
        r#"{{
            "breakpoints": [0.0, 10.0],
            "edges": {{"left":[0.0,0.0],"right":[10.0,10.0],"parent":[0,0],"child":[1,2]}},
            "nodes": {{"time":{times}}}
        }}"#
    );
    let f = file.as_file_mut();
    f.set_len(0).expect("truncate");
    f.seek(std::io::SeekFrom::Start(0)).expect("seek");
    f.write_all(body.as_bytes()).expect("write dataset");
    f.sync_all().expect("sync");
}

struct CountingLoader {
    inner: JsonDatasetLoader,
    loads: AtomicUsize,
}

impl CountingLoader {
    fn new() -> Arc<Self> {
        Arc::new(CountingLoader {
            inner: JsonDatasetLoader,
            loads: AtomicUsize::new(0),
        })
    }
}

impl DatasetLoader for CountingLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path)
    }
}

/// Loader that parks on a shared barrier so the test can prove two loads
/// were in flight at the same time.
struct BarrierLoader {
    inner: JsonDatasetLoader,
    barrier: Barrier,
}

impl DatasetLoader for BarrierLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        self.barrier.wait();
        self.inner.load(path)
    }
}

struct SlowLoader {
    inner: JsonDatasetLoader,
    delay: Duration,
}

impl DatasetLoader for SlowLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        std::thread::sleep(self.delay);
        self.inner.load(path)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_loads_of_one_path_collapse_into_one_parse() {
    let file = write_dataset(0);
    let loader = CountingLoader::new();
    let cache = Arc::new(FileCache::new(
        loader.clone(),
        2,
        Duration::from_secs(10),
    ));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let path = file.path().to_path_buf();
        tasks.push(tokio::spawn(async move { cache.get(&path).await }));
    }
    for task in tasks {
        task.await.expect("join").expect("load");
    }
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loads_of_distinct_paths_do_not_serialize() {
    let file_a = write_dataset(0);
    let file_b = write_dataset(1);
    let cache = Arc::new(FileCache::new(
        Arc::new(BarrierLoader {
            inner: JsonDatasetLoader,
            barrier: Barrier::new(2),
        }),
        2,
        Duration::from_secs(10),
    ));

    // Both loads must reach the barrier simultaneously or this would hang;
    // serialized loads could never rendezvous.
    let a = {
        let cache = Arc::clone(&cache);
        let path = file_a.path().to_path_buf();
        tokio::spawn(async move { cache.get(&path).await })
    };
    let b = {
        let cache = Arc::clone(&cache);
        let path = file_b.path().to_path_buf();
        tokio::spawn(async move { cache.get(&path).await })
    };
    let (a, b) = tokio::join!(a, b);
    assert!(a.expect("join").is_ok());
    assert!(b.expect("join").is_ok());
}

#[tokio::test]
async fn modification_time_change_forces_a_reload() {
    let mut file = write_dataset(0);
    let loader = CountingLoader::new();
    let cache = FileCache::new(loader.clone(), 2, Duration::from_secs(10));

    let ctx = cache.get(file.path()).await.expect("first load");
    assert_eq!(ctx.summary.num_nodes, 3);
    cache.get(file.path()).await.expect("cached hit");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

    // Rewrite with one more node; the mtime bump is the invalidation signal.
    std::thread::sleep(Duration::from_millis(20));
    write_dataset_to(&mut file, 1);

    let fresh = cache.get(file.path()).await.expect("reload");
    assert_eq!(fresh.summary.num_nodes, 4);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_path_is_not_found() {
    let cache = FileCache::new(CountingLoader::new(), 2, Duration::from_secs(10));
    let err = cache.get(Path::new("/nonexistent/dataset.json")).await;
    assert!(matches!(err, Err(LayoutError::NotFound(_))));
}

#[tokio::test]
async fn failed_load_is_not_poisoned() {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, "{{ definitely not a dataset").expect("write");
    file.as_file().sync_all().expect("sync");

    let loader = CountingLoader::new();
    let cache = FileCache::new(loader.clone(), 2, Duration::from_secs(10));

    let err = cache.get(file.path()).await;
    assert!(matches!(err, Err(LayoutError::LoadError(_))));
    assert!(cache.is_empty());

    std::thread::sleep(Duration::from_millis(20));
    write_dataset_to(&mut file, 0);
    let ctx = cache.get(file.path()).await.expect("retry succeeds");
    assert_eq!(ctx.summary.num_nodes, 3);
}

#[tokio::test]
async fn capacity_eviction_keeps_the_cache_small() {
    let file_a = write_dataset(0);
    let file_b = write_dataset(1);
    let cache = FileCache::new(CountingLoader::new(), 1, Duration::from_secs(10));

    cache.get(file_a.path()).await.expect("load a");
    cache.get(file_b.path()).await.expect("load b");
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_timeout_surfaces_as_a_typed_error() {
    let file = write_dataset(0);
    let cache = Arc::new(FileCache::new(
        Arc::new(SlowLoader {
            inner: JsonDatasetLoader,
            delay: Duration::from_millis(500),
        }),
        2,
        Duration::from_millis(50),
    ));

    let leader = {
        let cache = Arc::clone(&cache);
        let path = file.path().to_path_buf();
        tokio::spawn(async move { cache.get(&path).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = cache.get(file.path()).await;
    assert!(matches!(err, Err(LayoutError::LockTimeout(_))));
    assert!(leader.await.expect("join").is_ok());
}
