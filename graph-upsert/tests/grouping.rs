//! Property tests for edge grouping.

use chrono::Utc;
use graph_upsert::driver::{EdgeMerge, GraphDriver, GraphTxn, MemoryGraph, NodeUpsert};
use graph_upsert::edges::{group_by_shape, EdgeDescriptor};
use graph_upsert::nodes::EntityRecord;
use graph_upsert::pipeline::{Loader, RetryPolicy};
use graph_upsert::{BatchSummary, LoaderConfig};
use proptest::prelude::*;

fn descriptor() -> impl Strategy<Value = EdgeDescriptor> {
    (
        prop::sample::select(vec!["sample", "file"]),
        prop::sample::select(vec!["participant", "study"]),
        prop::sample::select(vec!["guid", "participant_id"]),
        "[a-z]{1,3}",
        "[a-z]{1,3}",
    )
        .prop_map(|(src, dst, dst_prop, src_match, dst_match)| EdgeDescriptor {
            src_label: src.to_string(),
            src_prop: "guid".to_string(),
            src_match,
            dst_label: dst.to_string(),
            dst_prop: dst_prop.to_string(),
            dst_match,
            handle: format!("of_{dst}"),
        })
}

proptest! {
    #[test]
    fn grouping_preserves_every_descriptor(edges in prop::collection::vec(descriptor(), 0..64)) {
        let groups = group_by_shape(edges.clone());

        let total: usize = groups.values().map(Vec::len).sum();
        prop_assert_eq!(total, edges.len());

        for (shape, members) in &groups {
            prop_assert!(!members.is_empty());
            for edge in members {
                prop_assert_eq!(&edge.shape(), shape);
            }
        }

        // Source order is kept inside each group.
        for (shape, members) in &groups {
            let expected: Vec<&EdgeDescriptor> = edges.iter().filter(|e| &e.shape() == shape).collect();
            let actual: Vec<&EdgeDescriptor> = members.iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}

// Descriptors over a small id space, so duplicates, dangling ends and shapes
// resolving to the same relationship all come up.
fn resolvable_descriptor() -> impl Strategy<Value = EdgeDescriptor> {
    (
        prop::sample::select(vec!["sample", "file"]),
        prop::sample::select(vec!["participant", "study"]),
        prop::sample::select(vec!["guid", "participant_id"]),
        prop::sample::select(vec!["s0", "s1", "s2", "s9"]),
        prop::sample::select(vec!["p0", "p1", "p2", "p9"]),
    )
        .prop_map(|(src, dst, dst_prop, src_match, dst_match)| EdgeDescriptor {
            src_label: src.to_string(),
            src_prop: "guid".to_string(),
            src_match: src_match.to_string(),
            dst_label: dst.to_string(),
            dst_prop: dst_prop.to_string(),
            dst_match: dst_match.to_string(),
            handle: format!("of_{dst}"),
        })
}

/// A graph holding every endpoint except the `*9` ids.
async fn seeded() -> MemoryGraph {
    let graph = MemoryGraph::new();
    let sources: Vec<EntityRecord> = ["s0", "s1", "s2"]
        .into_iter()
        .map(|id| [("guid", id)].into_iter().collect())
        .collect();
    let targets: Vec<EntityRecord> = ["p0", "p1", "p2"]
        .into_iter()
        .map(|id| [("guid", id), ("participant_id", id)].into_iter().collect())
        .collect();

    let mut txn = graph.begin().await.unwrap();
    for (label, records, keys) in [
        ("sample", &sources, vec!["guid"]),
        ("file", &sources, vec!["guid"]),
        ("participant", &targets, vec!["guid", "participant_id"]),
        ("study", &targets, vec!["guid", "participant_id"]),
    ] {
        txn.upsert_nodes(&NodeUpsert {
            label,
            id_field: "guid",
            keys,
            records,
            stamp: Utc::now(),
        })
        .await
        .unwrap();
    }
    txn.commit().await.unwrap();
    graph
}

/// Merge descriptors one statement and one commit at a time.
async fn merge_one_by_one(graph: &MemoryGraph, edges: &[EdgeDescriptor]) -> BatchSummary {
    let mut total = BatchSummary::default();
    for edge in edges {
        let shape = edge.shape();
        let mut txn = graph.begin().await.unwrap();
        total += txn
            .merge_edges(&EdgeMerge {
                shape: &shape,
                edges: std::slice::from_ref(edge),
                stamp: Utc::now(),
            })
            .await
            .unwrap();
        txn.commit().await.unwrap();
    }
    total
}

proptest! {
    #[test]
    fn grouped_write_matches_one_by_one_write(edges in prop::collection::vec(resolvable_descriptor(), 1..48)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (grouped, grouped_count, single, single_count) = rt.block_on(async {
            let grouped_graph = seeded().await;
            let loader = Loader::new(grouped_graph.clone(), &LoaderConfig::default())
                .with_retry_policy(RetryPolicy::immediate(1));
            let grouped = loader.upsert_chunk_relationships(0, edges.clone()).await.unwrap();

            let single_graph = seeded().await;
            let single = merge_one_by_one(&single_graph, &edges).await;
            (grouped, grouped_graph.relationship_count(), single, single_graph.relationship_count())
        });

        prop_assert_eq!(grouped.relationships_created, single.relationships_created);
        prop_assert_eq!(grouped.relationships_skipped, single.relationships_skipped);
        prop_assert_eq!(grouped_count, single_count);
        prop_assert_eq!(grouped.relationships_created as usize, grouped_count);
    }
}
