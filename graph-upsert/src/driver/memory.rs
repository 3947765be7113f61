//! In-process graph store.
//!
//! Mirrors the semantics of the Cypher statements the Neo4j backend issues:
//! nodes MERGE on `(label, id property)`, relationships MERGE on
//! `(src, handle, dst)` between endpoints that must already exist.
//!
//! Every property value is indexed and relationships are keyed by
//! `(src, handle, dst)`, so a statement costs time proportional to its own
//! rows, not to the size of the graph. A transaction writes in place and keeps
//! an undo log; rollback, or dropping an uncommitted transaction, replays it
//! backwards. One transaction is expected to be open at a time. Statements can
//! be made to fail on demand to exercise retry paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{EdgeMerge, GraphDriver, GraphTxn, NodeUpsert};
use crate::errors::{LoaderError, Result};
use crate::summary::BatchSummary;

/// A stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemNode {
    pub label: String,
    pub properties: BTreeMap<String, String>,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

/// A stored relationship between two node ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRelationship {
    pub src: i64,
    pub dst: i64,
    pub handle: String,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

impl MemRelationship {
    fn key(&self) -> RelKey {
        (self.src, self.handle.clone(), self.dst)
    }
}

type RelKey = (i64, String, i64);

/// label -> property -> value -> node ids.
type PropertyIndex = HashMap<String, HashMap<String, HashMap<String, BTreeSet<i64>>>>;

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<i64, MemNode>,
    index: PropertyIndex,
    relationships: HashMap<RelKey, MemRelationship>,
    /// Keys of every relationship touching a node, in either direction.
    adjacency: HashMap<i64, HashSet<RelKey>>,
    next_id: i64,
}

fn index_insert(index: &mut PropertyIndex, id: i64, label: &str, properties: &BTreeMap<String, String>) {
    let by_prop = index.entry(label.to_string()).or_default();
    for (prop, value) in properties {
        by_prop
            .entry(prop.clone())
            .or_default()
            .entry(value.clone())
            .or_default()
            .insert(id);
    }
}

fn index_remove(index: &mut PropertyIndex, id: i64, label: &str, properties: &BTreeMap<String, String>) {
    let Some(by_prop) = index.get_mut(label) else {
        return;
    };
    for (prop, value) in properties {
        if let Some(by_value) = by_prop.get_mut(prop) {
            if let Some(ids) = by_value.get_mut(value) {
                ids.remove(&id);
                if ids.is_empty() {
                    by_value.remove(value);
                }
            }
        }
    }
}

impl GraphState {
    fn find_nodes(&self, label: &str, prop: &str, value: &str) -> Vec<i64> {
        self.index
            .get(label)
            .and_then(|by_prop| by_prop.get(prop))
            .and_then(|by_value| by_value.get(value))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn first_node(&self, label: &str, prop: &str, value: &str) -> Option<i64> {
        self.index
            .get(label)
            .and_then(|by_prop| by_prop.get(prop))
            .and_then(|by_value| by_value.get(value))
            .and_then(|ids| ids.iter().next().copied())
    }

    fn insert_node(&mut self, id: i64, node: MemNode) {
        index_insert(&mut self.index, id, &node.label, &node.properties);
        self.nodes.insert(id, node);
    }

    /// Swap in new properties and `updated` stamp, returning the old ones.
    fn replace_properties(
        &mut self,
        id: i64,
        properties: BTreeMap<String, String>,
        updated: Option<DateTime<Utc>>,
    ) -> Option<(BTreeMap<String, String>, Option<DateTime<Utc>>)> {
        let node = self.nodes.get_mut(&id)?;
        index_remove(&mut self.index, id, &node.label, &node.properties);
        let old_properties = mem::replace(&mut node.properties, properties);
        let old_updated = mem::replace(&mut node.updated, updated);
        index_insert(&mut self.index, id, &node.label, &node.properties);
        Some((old_properties, old_updated))
    }

    /// Detach-delete one node, returning it and the relationships it lost.
    fn remove_node(&mut self, id: i64) -> Option<(MemNode, Vec<MemRelationship>)> {
        let node = self.nodes.remove(&id)?;
        index_remove(&mut self.index, id, &node.label, &node.properties);

        let mut lost = Vec::new();
        for key in self.adjacency.remove(&id).unwrap_or_default() {
            if let Some(rel) = self.relationships.remove(&key) {
                let other = if rel.src == id { rel.dst } else { rel.src };
                if let Some(keys) = self.adjacency.get_mut(&other) {
                    keys.remove(&key);
                }
                lost.push(rel);
            }
        }
        Some((node, lost))
    }

    fn insert_relationship(&mut self, rel: MemRelationship) {
        let key = rel.key();
        self.adjacency.entry(rel.src).or_default().insert(key.clone());
        self.adjacency.entry(rel.dst).or_default().insert(key.clone());
        self.relationships.insert(key, rel);
    }

    fn remove_relationship(&mut self, key: &RelKey) {
        if let Some(rel) = self.relationships.remove(key) {
            for end in [rel.src, rel.dst] {
                if let Some(keys) = self.adjacency.get_mut(&end) {
                    keys.remove(key);
                }
            }
        }
    }

    fn neighbours(&self, id: i64) -> impl Iterator<Item = i64> + '_ {
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |(src, _, dst)| if *src == id { *dst } else { *src })
    }
}

/// One reversible change made by an open transaction.
#[derive(Debug)]
enum Undo {
    InsertNode(i64),
    SetNode {
        id: i64,
        properties: BTreeMap<String, String>,
        updated: Option<DateTime<Utc>>,
    },
    InsertRelationship(RelKey),
    TouchRelationship {
        key: RelKey,
        updated: Option<DateTime<Utc>>,
    },
    DeleteNode {
        id: i64,
        node: MemNode,
        relationships: Vec<MemRelationship>,
    },
}

impl Undo {
    fn revert(self, state: &mut GraphState) {
        match self {
            Undo::InsertNode(id) => {
                state.remove_node(id);
            }
            Undo::SetNode {
                id,
                properties,
                updated,
            } => {
                state.replace_properties(id, properties, updated);
            }
            Undo::InsertRelationship(key) => state.remove_relationship(&key),
            Undo::TouchRelationship { key, updated } => {
                if let Some(rel) = state.relationships.get_mut(&key) {
                    rel.updated = updated;
                }
            }
            Undo::DeleteNode {
                id,
                node,
                relationships,
            } => {
                state.insert_node(id, node);
                for rel in relationships {
                    state.insert_relationship(rel);
                }
            }
        }
    }
}

/// Shared in-memory graph. Cloning yields another handle to the same graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<GraphState>>,
    pending_failures: Arc<AtomicU32>,
    statements: Arc<AtomicU64>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` statements fail with a driver error.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Statements executed so far, failed ones included.
    pub fn statements_run(&self) -> u64 {
        self.statements.load(Ordering::SeqCst)
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.lock().relationships.len()
    }

    /// The node of `label` whose `prop` equals `value`, if any.
    pub fn node(&self, label: &str, prop: &str, value: &str) -> Option<MemNode> {
        let state = self.lock();
        state
            .first_node(label, prop, value)
            .and_then(|id| state.nodes.get(&id).cloned())
    }

    /// Every node, in creation order.
    pub fn nodes(&self) -> Vec<MemNode> {
        self.lock().nodes.values().cloned().collect()
    }

    /// Number of relationships named `handle` from the node(s) addressed by
    /// `src` to the node(s) addressed by `dst`.
    pub fn relationships_between(
        &self,
        (src_label, src_prop, src_value): (&str, &str, &str),
        handle: &str,
        (dst_label, dst_prop, dst_value): (&str, &str, &str),
    ) -> usize {
        let state = self.lock();
        let dsts = state.find_nodes(dst_label, dst_prop, dst_value);
        state
            .find_nodes(src_label, src_prop, src_value)
            .into_iter()
            .flat_map(|src| dsts.iter().map(move |dst| (src, handle.to_string(), *dst)))
            .filter(|key| state.relationships.contains_key(key))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GraphDriver for MemoryGraph {
    type Txn = MemoryTxn;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn begin(&self) -> Result<MemoryTxn> {
        Ok(MemoryTxn {
            graph: self.clone(),
            undo: Vec::new(),
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// An open transaction. Uncommitted changes are reverted when it is dropped.
#[derive(Debug)]
pub struct MemoryTxn {
    graph: MemoryGraph,
    undo: Vec<Undo>,
}

impl MemoryTxn {
    /// Count the statement and consume one pending injected failure.
    fn statement(&self) -> Result<()> {
        self.graph.statements.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .graph
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(LoaderError::Driver("injected statement failure".to_string()));
        }
        Ok(())
    }

    fn delete_nodes(&mut self, ids: impl IntoIterator<Item = i64>) -> u64 {
        let mut state = self.graph.lock();
        let mut deleted = 0;
        for id in ids {
            if let Some((node, relationships)) = state.remove_node(id) {
                self.undo.push(Undo::DeleteNode {
                    id,
                    node,
                    relationships,
                });
                deleted += 1;
            }
        }
        deleted
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        let mut state = self.graph.lock();
        while let Some(change) = self.undo.pop() {
            change.revert(&mut state);
        }
    }
}

impl GraphTxn for MemoryTxn {
    async fn upsert_nodes(&mut self, op: &NodeUpsert<'_>) -> Result<BatchSummary> {
        self.statement()?;
        let mut state = self.graph.lock();
        let mut created = HashSet::new();
        let mut matched = HashSet::new();

        for record in op.records {
            let id_value = record.id(op.id_field).ok_or_else(|| {
                LoaderError::Driver(format!(
                    "cannot merge {} node with null `{}`",
                    op.label, op.id_field
                ))
            })?;

            let (node_id, inserted) = match state.first_node(op.label, op.id_field, id_value) {
                Some(id) => (id, false),
                None => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.insert_node(
                        id,
                        MemNode {
                            label: op.label.to_string(),
                            properties: BTreeMap::new(),
                            created: op.stamp,
                            updated: None,
                        },
                    );
                    self.undo.push(Undo::InsertNode(id));
                    (id, true)
                }
            };

            let Some(node) = state.nodes.get(&node_id) else {
                continue;
            };
            if node.created == op.stamp {
                created.insert(node_id);
            } else {
                matched.insert(node_id);
            }

            let mut properties = node.properties.clone();
            properties.insert(op.id_field.to_string(), id_value.to_string());
            for key in &op.keys {
                match record.get(key) {
                    Some(value) => {
                        properties.insert(key.to_string(), value.to_string());
                    }
                    None => {
                        properties.remove(*key);
                    }
                }
            }
            let updated = if inserted { None } else { Some(op.stamp) };
            if let Some((properties, updated)) = state.replace_properties(node_id, properties, updated) {
                self.undo.push(Undo::SetNode {
                    id: node_id,
                    properties,
                    updated,
                });
            }
        }

        Ok(BatchSummary {
            nodes_created: created.len() as u64,
            nodes_updated: matched.len() as u64,
            properties_set: op.records.len() as u64 * (op.keys.len() as u64 + 1),
            ..Default::default()
        })
    }

    async fn merge_edges(&mut self, op: &EdgeMerge<'_>) -> Result<BatchSummary> {
        self.statement()?;
        let shape = op.shape;
        let mut state = self.graph.lock();
        let mut created = HashSet::new();
        let mut matched = HashSet::new();
        let mut rows = 0u64;

        for edge in op.edges {
            let srcs = state.find_nodes(&shape.src_label, &shape.src_prop, &edge.src_match);
            let dsts = state.find_nodes(&shape.dst_label, &shape.dst_prop, &edge.dst_match);
            for &src in &srcs {
                for &dst in &dsts {
                    rows += 1;
                    let key = (src, shape.handle.clone(), dst);
                    let rel_created = match state.relationships.get_mut(&key) {
                        Some(rel) => {
                            let previous = mem::replace(&mut rel.updated, Some(op.stamp));
                            self.undo.push(Undo::TouchRelationship {
                                key: key.clone(),
                                updated: previous,
                            });
                            rel.created
                        }
                        None => {
                            state.insert_relationship(MemRelationship {
                                src,
                                dst,
                                handle: shape.handle.clone(),
                                created: op.stamp,
                                updated: None,
                            });
                            self.undo.push(Undo::InsertRelationship(key.clone()));
                            op.stamp
                        }
                    };
                    if rel_created == op.stamp {
                        created.insert(key);
                    } else {
                        matched.insert(key);
                    }
                }
            }
        }

        Ok(BatchSummary {
            relationships_created: created.len() as u64,
            relationships_updated: matched.len() as u64,
            relationships_skipped: (op.edges.len() as u64).saturating_sub(rows),
            properties_set: rows,
            ..Default::default()
        })
    }

    async fn delete_any(&mut self, limit: usize) -> Result<u64> {
        self.statement()?;
        let ids: Vec<i64> = self.graph.lock().nodes.keys().take(limit).copied().collect();
        Ok(self.delete_nodes(ids))
    }

    async fn subgraph_ids(&mut self, label: &str, prop: &str, value: &str) -> Result<Vec<i64>> {
        self.statement()?;
        let state = self.graph.lock();
        let roots = state.find_nodes(label, prop, value);

        let mut seen: BTreeSet<i64> = roots.iter().copied().collect();
        let mut order = roots.clone();
        let mut queue: VecDeque<i64> = roots.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            for next in state.neighbours(current) {
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        Ok(order)
    }

    async fn delete_ids(&mut self, ids: &[i64]) -> Result<u64> {
        self.statement()?;
        Ok(self.delete_nodes(ids.iter().copied()))
    }

    async fn commit(mut self) -> Result<()> {
        self.undo.clear();
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::{EdgeDescriptor, EdgeShape};
    use crate::nodes::EntityRecord;

    fn records(ids: &[&str]) -> Vec<EntityRecord> {
        ids.iter()
            .map(|id| [("guid", *id), ("name", "x")].into_iter().collect())
            .collect()
    }

    fn upsert<'a>(label: &'a str, records: &'a [EntityRecord]) -> NodeUpsert<'a> {
        NodeUpsert {
            label,
            id_field: "guid",
            keys: vec!["guid", "name"],
            records,
            stamp: Utc::now(),
        }
    }

    fn shape() -> EdgeShape {
        EdgeShape {
            src_label: "sample".to_string(),
            dst_label: "participant".to_string(),
            handle: "of_participant".to_string(),
            src_prop: "guid".to_string(),
            dst_prop: "guid".to_string(),
        }
    }

    fn edge(src: &str, dst: &str) -> EdgeDescriptor {
        EdgeDescriptor {
            src_label: "sample".to_string(),
            src_prop: "guid".to_string(),
            src_match: src.to_string(),
            dst_label: "participant".to_string(),
            dst_prop: "guid".to_string(),
            dst_match: dst.to_string(),
            handle: "of_participant".to_string(),
        }
    }

    fn link(graph: &MemoryGraph, src: &str, dst: &str) -> usize {
        graph.relationships_between(("sample", "guid", src), "of_participant", ("participant", "guid", dst))
    }

    async fn seed(graph: &MemoryGraph) {
        let samples = records(&["s1", "s2"]);
        let participants = records(&["p1"]);
        let shape = shape();
        let edges = vec![edge("s1", "p1"), edge("s2", "p1")];
        let mut txn = graph.begin().await.unwrap();
        txn.upsert_nodes(&upsert("sample", &samples)).await.unwrap();
        txn.upsert_nodes(&upsert("participant", &participants)).await.unwrap();
        txn.merge_edges(&EdgeMerge {
            shape: &shape,
            edges: &edges,
            stamp: Utc::now(),
        })
        .await
        .unwrap();
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_discards_inserted_nodes() {
        let graph = MemoryGraph::new();
        let recs = records(&["s1", "s2"]);

        let mut txn = graph.begin().await.unwrap();
        txn.upsert_nodes(&upsert("sample", &recs)).await.unwrap();
        txn.rollback().await.unwrap();
        assert_eq!(graph.node_count(), 0);
        assert!(graph.node("sample", "guid", "s1").is_none());

        let mut txn = graph.begin().await.unwrap();
        let summary = txn.upsert_nodes(&upsert("sample", &recs)).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(summary.nodes_created, 2);
        assert_eq!(graph.node_count(), 2);
    }

    #[tokio::test]
    async fn rollback_restores_previous_properties() {
        let graph = MemoryGraph::new();
        let before: Vec<EntityRecord> = vec![[("guid", "s1"), ("name", "old")].into_iter().collect()];
        let after: Vec<EntityRecord> = vec![[("guid", "s1"), ("name", "new")].into_iter().collect()];

        let mut txn = graph.begin().await.unwrap();
        txn.upsert_nodes(&upsert("sample", &before)).await.unwrap();
        txn.commit().await.unwrap();
        let committed = graph.node("sample", "guid", "s1").unwrap();

        let mut txn = graph.begin().await.unwrap();
        txn.upsert_nodes(&upsert("sample", &after)).await.unwrap();
        assert!(graph.node("sample", "name", "new").is_some());
        txn.rollback().await.unwrap();

        assert_eq!(graph.node("sample", "guid", "s1").unwrap(), committed);
        assert!(graph.node("sample", "name", "new").is_none());
        assert!(graph.node("sample", "name", "old").is_some());
    }

    #[tokio::test]
    async fn changed_property_is_reindexed() {
        let graph = MemoryGraph::new();
        let first: Vec<EntityRecord> = vec![[("guid", "s1"), ("name", "a")].into_iter().collect()];
        let second: Vec<EntityRecord> = vec![[("guid", "s1"), ("name", "b")].into_iter().collect()];
        for recs in [&first, &second] {
            let mut txn = graph.begin().await.unwrap();
            txn.upsert_nodes(&upsert("sample", recs)).await.unwrap();
            txn.commit().await.unwrap();
        }
        assert!(graph.node("sample", "name", "a").is_none());
        assert!(graph.node("sample", "name", "b").is_some());
        assert_eq!(graph.node_count(), 1);
    }

    #[tokio::test]
    async fn rollback_restores_deleted_nodes_and_their_relationships() {
        let graph = MemoryGraph::new();
        seed(&graph).await;
        let before = graph.nodes();

        let mut txn = graph.begin().await.unwrap();
        assert_eq!(txn.delete_any(10).await.unwrap(), 3);
        assert_eq!(graph.relationship_count(), 0);
        txn.rollback().await.unwrap();

        assert_eq!(graph.nodes(), before);
        assert_eq!(graph.relationship_count(), 2);
        assert_eq!(link(&graph, "s1", "p1"), 1);
        assert_eq!(link(&graph, "s2", "p1"), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_is_rolled_back() {
        let graph = MemoryGraph::new();
        seed(&graph).await;
        {
            let mut txn = graph.begin().await.unwrap();
            let ids = txn.subgraph_ids("participant", "guid", "p1").await.unwrap();
            assert_eq!(ids.len(), 3);
            txn.delete_ids(&ids).await.unwrap();
            assert_eq!(graph.node_count(), 0);
        }
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.relationship_count(), 2);
    }

    #[tokio::test]
    async fn rollback_keeps_relationship_stamps() {
        let graph = MemoryGraph::new();
        seed(&graph).await;
        let shape = shape();
        let edges = vec![edge("s1", "p1"), edge("s1", "p1")];

        let mut txn = graph.begin().await.unwrap();
        let summary = txn
            .merge_edges(&EdgeMerge {
                shape: &shape,
                edges: &edges,
                stamp: Utc::now(),
            })
            .await
            .unwrap();
        txn.rollback().await.unwrap();

        assert_eq!(summary.relationships_created, 0);
        assert_eq!(summary.relationships_updated, 1);
        let state = graph.lock();
        assert!(state.relationships.values().all(|rel| rel.updated.is_none()));
    }

    #[tokio::test]
    async fn large_loads_scale_with_batch_size() {
        const NODES: usize = 30_000;
        const BATCH: usize = 1_000;

        let graph = MemoryGraph::new();
        let sample_ids: Vec<String> = (0..NODES).map(|i| format!("s{i}")).collect();
        let participant_ids: Vec<String> = (0..NODES).map(|i| format!("p{i}")).collect();
        let shape = shape();
        let started = std::time::Instant::now();

        for (samples, participants) in sample_ids.chunks(BATCH).zip(participant_ids.chunks(BATCH)) {
            let sample_recs = records(&samples.iter().map(String::as_str).collect::<Vec<_>>());
            let participant_recs = records(&participants.iter().map(String::as_str).collect::<Vec<_>>());
            let edges: Vec<EdgeDescriptor> = samples
                .iter()
                .zip(participants)
                .map(|(s, p)| edge(s, p))
                .collect();

            let mut txn = graph.begin().await.unwrap();
            txn.upsert_nodes(&upsert("sample", &sample_recs)).await.unwrap();
            txn.upsert_nodes(&upsert("participant", &participant_recs)).await.unwrap();
            let summary = txn
                .merge_edges(&EdgeMerge {
                    shape: &shape,
                    edges: &edges,
                    stamp: Utc::now(),
                })
                .await
                .unwrap();
            txn.commit().await.unwrap();
            assert_eq!(summary.relationships_created, BATCH as u64);
        }

        assert_eq!(graph.node_count(), 2 * NODES);
        assert_eq!(graph.relationship_count(), NODES);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(15),
            "loading {NODES} rows took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_statement_merge_into_one_node() {
        let graph = MemoryGraph::new();
        let recs = records(&["s1", "s1"]);
        let mut txn = graph.begin().await.unwrap();
        let summary = txn.upsert_nodes(&upsert("sample", &recs)).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(summary.nodes_created, 1);
        assert_eq!(summary.nodes_updated, 0);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.node("sample", "guid", "s1").unwrap().updated.is_some());
    }

    #[tokio::test]
    async fn dangling_endpoints_are_skipped() {
        let graph = MemoryGraph::new();
        let samples = records(&["s1"]);
        let participants = records(&["p1"]);
        let mut txn = graph.begin().await.unwrap();
        txn.upsert_nodes(&upsert("sample", &samples)).await.unwrap();
        txn.upsert_nodes(&upsert("participant", &participants)).await.unwrap();

        let shape = shape();
        let edges = vec![edge("s1", "p1"), edge("s1", "missing")];
        let summary = txn
            .merge_edges(&EdgeMerge {
                shape: &shape,
                edges: &edges,
                stamp: Utc::now(),
            })
            .await
            .unwrap();
        txn.commit().await.unwrap();

        assert_eq!(summary.relationships_created, 1);
        assert_eq!(summary.relationships_skipped, 1);
        assert_eq!(graph.relationship_count(), 1);
        assert_eq!(
            graph.relationships_between(("sample", "guid", "s1"), "of_participant", ("participant", "guid", "p1")),
            1
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let graph = MemoryGraph::new();
        graph.fail_next(1);
        let mut txn = graph.begin().await.unwrap();
        assert!(txn.delete_any(10).await.is_err());
        assert_eq!(txn.delete_any(10).await.unwrap(), 0);
        assert_eq!(graph.statements_run(), 2);
    }
}
