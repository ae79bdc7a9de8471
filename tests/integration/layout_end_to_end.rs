use std::io::Write;
use std::sync::Arc;

use arbor::dataset::JsonDatasetLoader;
use arbor::graph::wire::{decode_layout, DecodedColumn};
use arbor::graph::ViewportParams;
use arbor::lineage::SearchCriteria;
use arbor::{Config, LayoutError, LayoutRequest, LayoutService};
use tempfile::NamedTempFile;

/// Two local trees over [0, 20):
///   tree 0: 0 -> {1, 2}
///   tree 1: 3 -> {1, 2}, with one mutation at position 15 above node 1.
fn write_dataset() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{
            "breakpoints": [0.0, 10.0, 20.0],
            "edges": {{
                "left":   [0.0, 0.0, 10.0, 10.0],
                "right":  [10.0, 10.0, 20.0, 20.0],
                "parent": [0, 0, 3, 3],
                "child":  [1, 2, 1, 2]
            }},
            "nodes": {{
                "time": [10.0, 0.0, 0.0, 6.0],
                "flags": [0, 1, 1, 0],
                "metadata": [null, "{{\"pop\":\"A\"}}", "{{\"pop\":\"B\"}}", null]
            }},
            "mutations": {{"position": [15.0], "node": [1]}}
        }}"#
    )
    .expect("write dataset");
    file
}

fn service() -> LayoutService {
    LayoutService::new(Config::default(), Arc::new(JsonDatasetLoader))
}

#[tokio::test]
async fn layout_produces_decodable_buffer_and_populates_the_session() {
    let file = write_dataset();
    let svc = service();

    let resp = svc
        .layout(LayoutRequest {
            dataset: file.path().to_path_buf(),
            session: "s1".into(),
            tree_indices: vec![0, 1],
            sparsify: false,
            viewport: None,
        })
        .await
        .expect("layout");

    assert_eq!(resp.processed, vec![0, 1]);
    assert_eq!(resp.min_time, 0.0);
    assert_eq!(resp.max_time, 10.0);

    let (nodes, muts) = decode_layout(&resp.buffer).expect("decode");
    assert_eq!(nodes.rows, 6);
    assert_eq!(muts.rows, 1);
    assert_eq!(
        muts.column("mut_tree_idx"),
        Some(&DecodedColumn::I32(vec![1]))
    );

    // The unsparsified graphs are retained for lineage queries.
    assert_eq!(svc.ancestors("s1", 0, 1).expect("ancestors"), vec![1, 0]);
    assert_eq!(svc.ancestors("s1", 1, 1).expect("ancestors"), vec![1, 3]);
}

#[tokio::test]
async fn out_of_range_index_is_skipped_while_valid_ones_succeed() {
    let file = write_dataset();
    let svc = service();

    let resp = svc
        .layout(LayoutRequest {
            dataset: file.path().to_path_buf(),
            session: "s1".into(),
            tree_indices: vec![0, 2],
            sparsify: false,
            viewport: None,
        })
        .await
        .expect("layout");
    assert_eq!(resp.processed, vec![0]);
}

#[tokio::test]
async fn lineage_before_layout_is_an_explicit_miss() {
    let file = write_dataset();
    let svc = service();

    let err = svc.ancestors("cold", 0, 1);
    assert!(matches!(err, Err(LayoutError::NotCached { tree: 0, .. })));

    svc.layout(LayoutRequest {
        dataset: file.path().to_path_buf(),
        session: "cold".into(),
        tree_indices: vec![0],
        sparsify: false,
        viewport: None,
    })
    .await
    .expect("layout");
    assert!(svc.ancestors("cold", 0, 1).is_ok());

    svc.clear_session("cold");
    assert!(matches!(
        svc.ancestors("cold", 0, 1),
        Err(LayoutError::NotCached { .. })
    ));
}

#[tokio::test]
async fn cache_visible_inserts_missing_and_evicts_the_rest() {
    let file = write_dataset();
    let svc = service();

    svc.layout(LayoutRequest {
        dataset: file.path().to_path_buf(),
        session: "s1".into(),
        tree_indices: vec![0, 1],
        sparsify: false,
        viewport: None,
    })
    .await
    .expect("layout");

    let newly = svc
        .cache_visible(file.path(), "s1", vec![1])
        .await
        .expect("cache_visible");
    assert_eq!(newly, 0);
    assert_eq!(svc.session_cache().get_all_for_session("s1"), vec![1]);

    let newly = svc
        .cache_visible(file.path(), "s1", vec![0, 1])
        .await
        .expect("cache_visible");
    assert_eq!(newly, 1);
    assert_eq!(svc.session_cache().get_all_for_session("s1"), vec![0, 1]);
}

#[tokio::test]
async fn sparsified_layout_keeps_mutations_consistent_with_nodes() {
    let file = write_dataset();
    let svc = service();

    let resp = svc
        .layout(LayoutRequest {
            dataset: file.path().to_path_buf(),
            session: "s1".into(),
            tree_indices: vec![0, 1],
            sparsify: true,
            viewport: Some(ViewportParams {
                tree_index: 1,
                x0: 0.0,
                x1: 0.5,
                y0: 0.0,
                y1: 0.5,
            }),
        })
        .await
        .expect("layout");

    let (nodes, muts) = decode_layout(&resp.buffer).expect("decode");
    let node_keys: std::collections::HashSet<(i32, i32)> = match (
        nodes.column("tree_idx"),
        nodes.column("node_id"),
    ) {
        (Some(DecodedColumn::I32(trees)), Some(DecodedColumn::I32(ids))) => {
            trees.iter().copied().zip(ids.iter().copied()).collect()
        }
        _ => panic!("missing node columns"),
    };
    match (muts.column("mut_tree_idx"), muts.column("mut_node_id")) {
        (Some(DecodedColumn::I32(trees)), Some(DecodedColumn::I32(ids))) => {
            for (t, id) in trees.iter().zip(ids) {
                assert!(
                    node_keys.contains(&(*t, *id)),
                    "mutation references ({t}, {id}) which is not in the node table"
                );
            }
        }
        _ => panic!("missing mutation columns"),
    }
}

#[tokio::test]
async fn mrca_and_search_run_against_the_cached_graph() {
    let file = write_dataset();
    let svc = service();

    svc.layout(LayoutRequest {
        dataset: file.path().to_path_buf(),
        session: "s1".into(),
        tree_indices: vec![0],
        sparsify: false,
        viewport: None,
    })
    .await
    .expect("layout");

    assert_eq!(svc.mrca("s1", 0, &[1, 2]).expect("mrca"), Some(0));
    let tips = svc
        .search(
            "s1",
            0,
            &SearchCriteria {
                tips_only: true,
                ..SearchCriteria::default()
            },
        )
        .expect("search");
    assert_eq!(tips.len(), 2);

    let sub = svc.subtree("s1", 0, 0).expect("subtree");
    assert_eq!(sub.nodes.len(), 3);
    assert_eq!(svc.descendants("s1", 0, 0, true).expect("descendants"), vec![1, 2]);
}
