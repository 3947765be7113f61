//! Upsert engine.
//!
//! Loads row files into the graph in two passes:
//! 1. **Nodes**: every chunk of every file becomes one set-based MERGE on
//!    `(entity type, identifying property)`, committed per chunk.
//! 2. **Relationships**: every chunk's edge descriptors are grouped by
//!    [`EdgeShape`] and merged inside one transaction per chunk; a failing
//!    chunk is rolled back and re-submitted whole under the [`RetryPolicy`].
//!
//! Node batches are not retried. Chunks committed before a failure stay
//! committed.

pub mod report;
pub mod retry;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::driver::{finish, EdgeMerge, GraphDriver, GraphTxn, NodeUpsert};
use crate::edges::{extract_relationships, group_by_shape, EdgeDescriptor, EdgeShape};
use crate::errors::{LoaderError, Result};
use crate::model::ModelIndex;
use crate::nodes::{extract_records, RecordBatch};
use crate::reader::{detect_encoding, ChunkReader};
use crate::summary::BatchSummary;
use crate::types::LoaderConfig;

pub use report::{FileLoadState, FileReport, LoadReport};
pub use retry::RetryPolicy;

/// Drives both passes against one shared [`GraphDriver`].
pub struct Loader<D: GraphDriver> {
    driver: D,
    id_field: String,
    subgraph_col: Option<String>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl<D: GraphDriver> Loader<D> {
    pub fn new(driver: D, config: &LoaderConfig) -> Self {
        Self {
            driver,
            id_field: config.id_field.clone(),
            subgraph_col: config.subgraph_col.clone(),
            chunk_size: config.chunk_size,
            retry: config.retry_policy(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    // ── Node pass ────────────────────────────────────────────────────────────

    /// Upsert one batch of records in its own transaction.
    ///
    /// Every record gets every key of the batch's key union; a key a record
    /// lacks is cleared on the stored node.
    pub async fn upsert_chunk_records(&self, batch: &RecordBatch) -> Result<BatchSummary> {
        if batch.is_empty() {
            return Ok(BatchSummary::default());
        }
        let keys: Vec<&str> = batch.property_keys().into_iter().collect();
        if !keys.contains(&self.id_field.as_str()) {
            return Err(LoaderError::MissingColumn(self.id_field.clone()));
        }

        let op = NodeUpsert {
            label: &batch.entity_type,
            id_field: &self.id_field,
            keys,
            records: &batch.records,
            stamp: Utc::now(),
        };
        let mut txn = self.driver.begin().await?;
        let result = txn.upsert_nodes(&op).await;
        finish(txn, result).await
    }

    /// Node pass over one file. A header-only file yields an empty summary.
    pub async fn upsert_file_records(&self, path: &Path) -> Result<BatchSummary> {
        let encoding = detect_encoding(path)?;
        let reader = ChunkReader::open(path, encoding, self.chunk_size)?;
        info!(file = %path.display(), %encoding, "loading nodes");

        let mut total = BatchSummary::default();
        for (batch_no, chunk) in reader.enumerate() {
            let chunk = chunk?;
            let batch = extract_records(&chunk, self.subgraph_col.as_deref())?;
            let summary = self.upsert_chunk_records(&batch).await.map_err(|e| {
                error!(file = %path.display(), batch = batch_no, error = %e, "node batch failed");
                e
            })?;
            info!(
                file = %path.display(),
                batch = batch_no,
                label = %batch.entity_type,
                rows = batch.records.len(),
                nodes_created = summary.nodes_created,
                nodes_updated = summary.nodes_updated,
                properties_set = summary.properties_set,
                "node batch committed"
            );
            total += summary;
        }
        Ok(total)
    }

    // ── Relationship pass ────────────────────────────────────────────────────

    /// Merge one chunk's edge descriptors, retrying the whole chunk on failure.
    ///
    /// All groups run in a single transaction, so a retry never repeats work
    /// that was already committed.
    pub async fn upsert_chunk_relationships(
        &self,
        batch_no: usize,
        edges: Vec<EdgeDescriptor>,
    ) -> Result<BatchSummary> {
        if edges.is_empty() {
            return Ok(BatchSummary::default());
        }
        let groups = group_by_shape(edges);
        let groups = &groups;
        self.retry
            .run(batch_no, move |_attempt| self.write_edge_groups(groups))
            .await
    }

    async fn write_edge_groups(
        &self,
        groups: &BTreeMap<EdgeShape, Vec<EdgeDescriptor>>,
    ) -> Result<BatchSummary> {
        let mut txn = self.driver.begin().await?;
        let result = merge_groups(&mut txn, groups).await;
        finish(txn, result).await
    }

    /// Relationship pass over one file.
    ///
    /// Chunks without relationship columns are skipped. Exhausted retries
    /// abort the file.
    pub async fn upsert_file_relationships<M>(&self, path: &Path, model: &M) -> Result<BatchSummary>
    where
        M: ModelIndex + ?Sized,
    {
        let encoding = detect_encoding(path)?;
        let reader = ChunkReader::open(path, encoding, self.chunk_size)?;
        info!(file = %path.display(), %encoding, "loading relationships");

        let mut total = BatchSummary::default();
        for (batch_no, chunk) in reader.enumerate() {
            let chunk = chunk?;
            let edges = extract_relationships(&chunk, model, &self.id_field)?;
            if edges.is_empty() {
                info!(file = %path.display(), batch = batch_no, "no relationships in batch, skipped");
                continue;
            }
            let submitted = edges.len();
            let summary = self
                .upsert_chunk_relationships(batch_no, edges)
                .await
                .map_err(|e| {
                    error!(file = %path.display(), batch = batch_no, error = %e, "relationship batch abandoned");
                    e
                })?;
            if summary.relationships_skipped > 0 {
                warn!(
                    file = %path.display(),
                    batch = batch_no,
                    skipped = summary.relationships_skipped,
                    "relationships with missing endpoints were not written"
                );
            }
            info!(
                file = %path.display(),
                batch = batch_no,
                submitted,
                relationships_created = summary.relationships_created,
                relationships_updated = summary.relationships_updated,
                "relationship batch committed"
            );
            total += summary;
        }
        Ok(total)
    }

    // ── Multi-file run ───────────────────────────────────────────────────────

    /// Load every file: nodes for all of them first, then relationships for
    /// those whose node pass succeeded. A failed file never stops the others.
    pub async fn load_files<M>(&self, paths: &[PathBuf], model: &M) -> LoadReport
    where
        M: ModelIndex + ?Sized,
    {
        let mut files: Vec<FileReport> = paths.iter().cloned().map(FileReport::new).collect();

        for file in &mut files {
            file.state = FileLoadState::NodesLoading;
            match self.upsert_file_records(&file.path).await {
                Ok(summary) => {
                    file.nodes = summary;
                    file.state = FileLoadState::NodesDone;
                }
                Err(e) => {
                    error!(file = %file.path.display(), error = %e, "node pass failed");
                    file.fail(e);
                }
            }
        }

        for file in &mut files {
            if file.state != FileLoadState::NodesDone {
                continue;
            }
            file.state = FileLoadState::EdgesLoading;
            match self.upsert_file_relationships(&file.path, model).await {
                Ok(summary) => {
                    file.relationships = summary;
                    file.state = FileLoadState::EdgesDone;
                }
                Err(e) => {
                    error!(file = %file.path.display(), error = %e, "relationship pass failed");
                    file.fail(e);
                }
            }
        }

        LoadReport { files }
    }
}

async fn merge_groups<T: GraphTxn>(
    txn: &mut T,
    groups: &BTreeMap<EdgeShape, Vec<EdgeDescriptor>>,
) -> Result<BatchSummary> {
    // Distinct stamps per group: two shapes can resolve to the same
    // relationship, which must count as created only once.
    let base = Utc::now();
    let mut total = BatchSummary::default();
    for (offset, (shape, edges)) in (0i64..).zip(groups) {
        total += txn
            .merge_edges(&EdgeMerge {
                shape,
                edges,
                stamp: base + Duration::nanoseconds(offset),
            })
            .await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryGraph;
    use crate::nodes::EntityRecord;

    fn loader(graph: &MemoryGraph) -> Loader<MemoryGraph> {
        Loader::new(graph.clone(), &LoaderConfig::default()).with_retry_policy(RetryPolicy::immediate(3))
    }

    fn batch(label: &str, ids: &[&str]) -> RecordBatch {
        RecordBatch {
            entity_type: label.to_string(),
            records: ids
                .iter()
                .map(|id| [("guid", *id), ("name", "n")].into_iter().collect::<EntityRecord>())
                .collect(),
        }
    }

    fn edge(src: &str, dst: &str) -> EdgeDescriptor {
        EdgeDescriptor {
            src_label: "sample".to_string(),
            src_prop: "guid".to_string(),
            src_match: src.to_string(),
            dst_label: "study".to_string(),
            dst_prop: "guid".to_string(),
            dst_match: dst.to_string(),
            handle: "of_study".to_string(),
        }
    }

    async fn seed(loader: &Loader<MemoryGraph>) {
        loader.upsert_chunk_records(&batch("study", &["st1"])).await.unwrap();
        loader.upsert_chunk_records(&batch("sample", &["s1", "s2"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_node_upsert_is_idempotent() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        let first = loader.upsert_chunk_records(&batch("sample", &["s1", "s2"])).await.unwrap();
        assert_eq!(first.nodes_created, 2);
        assert_eq!(first.properties_set, 6);

        let second = loader.upsert_chunk_records(&batch("sample", &["s1", "s2"])).await.unwrap();
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.nodes_updated, 2);
        assert_eq!(graph.node_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_issues_no_statement() {
        let graph = MemoryGraph::new();
        let summary = loader(&graph).upsert_chunk_records(&batch("sample", &[])).await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(graph.statements_run(), 0);
    }

    #[tokio::test]
    async fn test_batch_without_identifier_is_rejected() {
        let graph = MemoryGraph::new();
        let records = RecordBatch {
            entity_type: "sample".to_string(),
            records: vec![[("name", "x")].into_iter().collect()],
        };
        assert!(matches!(
            loader(&graph).upsert_chunk_records(&records).await,
            Err(LoaderError::MissingColumn(col)) if col == "guid"
        ));
    }

    #[tokio::test]
    async fn test_failed_node_batch_is_not_retried() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        graph.fail_next(1);
        assert!(loader.upsert_chunk_records(&batch("sample", &["s1"])).await.is_err());
        assert_eq!(graph.statements_run(), 1);
        assert_eq!(graph.node_count(), 0);
    }

    #[tokio::test]
    async fn test_relationships_fail_twice_then_succeed() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        seed(&loader).await;
        let before = graph.statements_run();

        graph.fail_next(2);
        let summary = loader
            .upsert_chunk_relationships(0, vec![edge("s1", "st1"), edge("s2", "st1")])
            .await
            .unwrap();
        assert_eq!(summary.relationships_created, 2);
        assert_eq!(graph.statements_run() - before, 3);
        assert_eq!(graph.relationship_count(), 2);
    }

    #[tokio::test]
    async fn test_relationships_fail_three_times() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        seed(&loader).await;
        let before = graph.statements_run();

        graph.fail_next(3);
        let err = loader
            .upsert_chunk_relationships(4, vec![edge("s1", "st1")])
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::RetriesExhausted { batch: 4, attempts: 3, .. }));
        assert_eq!(graph.statements_run() - before, 3);
        assert_eq!(graph.relationship_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_group_rolls_back_earlier_groups() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        seed(&loader).await;
        loader
            .upsert_chunk_records(&batch("participant", &["p1"]))
            .await
            .unwrap();

        let mut to_participant = edge("s1", "p1");
        to_participant.dst_label = "participant".to_string();
        to_participant.handle = "of_participant".to_string();
        let groups = group_by_shape(vec![edge("s1", "st1"), to_participant]);
        let mut shapes = groups.iter();
        let (first_shape, first_edges) = shapes.next().unwrap();
        let (second_shape, second_edges) = shapes.next().unwrap();

        let mut txn = graph.begin().await.unwrap();
        let first = txn
            .merge_edges(&EdgeMerge {
                shape: first_shape,
                edges: first_edges,
                stamp: Utc::now(),
            })
            .await;
        assert!(first.is_ok());

        graph.fail_next(1);
        let second = txn
            .merge_edges(&EdgeMerge {
                shape: second_shape,
                edges: second_edges,
                stamp: Utc::now(),
            })
            .await;
        assert!(finish(txn, second).await.is_err());
        assert_eq!(graph.relationship_count(), 0);
    }

    #[tokio::test]
    async fn test_dangling_references_are_counted_as_skipped() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        seed(&loader).await;
        let summary = loader
            .upsert_chunk_relationships(0, vec![edge("s1", "st1"), edge("s2", "nowhere")])
            .await
            .unwrap();
        assert_eq!(summary.relationships_created, 1);
        assert_eq!(summary.relationships_skipped, 1);
    }

    #[tokio::test]
    async fn test_relationship_rerun_creates_nothing() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        seed(&loader).await;
        let edges = vec![edge("s1", "st1"), edge("s2", "st1")];
        loader.upsert_chunk_relationships(0, edges.clone()).await.unwrap();
        let again = loader.upsert_chunk_relationships(0, edges).await.unwrap();
        assert_eq!(again.relationships_created, 0);
        assert_eq!(again.relationships_updated, 2);
        assert_eq!(graph.relationship_count(), 2);
    }

    #[tokio::test]
    async fn test_relationship_reached_by_two_shapes_is_created_once() {
        let graph = MemoryGraph::new();
        let loader = loader(&graph);
        seed(&loader).await;
        let mut by_name = edge("s1", "n");
        by_name.dst_prop = "name".to_string();

        let summary = loader
            .upsert_chunk_relationships(0, vec![edge("s1", "st1"), by_name])
            .await
            .unwrap();
        assert_eq!(summary.relationships_created, 1);
        assert_eq!(summary.relationships_updated, 1);
        assert_eq!(graph.relationship_count(), 1);
    }
}
