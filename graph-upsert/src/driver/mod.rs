//! Graph database driver abstraction.
//!
//! Defines the [`GraphDriver`] and [`GraphTxn`] traits the loader writes
//! through, plus two backends:
//! - [`neo4j::Neo4jDriver`]: Cypher over Bolt via `neo4rs`.
//! - [`memory::MemoryGraph`]: in-process store with the same MERGE / MATCH
//!   semantics, used for dry runs and tests.

pub mod memory;
pub mod neo4j;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::edges::{EdgeDescriptor, EdgeShape};
use crate::errors::Result;
use crate::nodes::EntityRecord;
use crate::summary::BatchSummary;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jDriver;

/// One set-based node upsert: MERGE every record on `(label, id_field)`.
#[derive(Debug, Clone)]
pub struct NodeUpsert<'a> {
    pub label: &'a str,
    pub id_field: &'a str,
    /// Union of property keys across `records`.
    pub keys: Vec<&'a str>,
    pub records: &'a [EntityRecord],
    /// Written as `created` on new nodes and `updated` on matched ones.
    pub stamp: DateTime<Utc>,
}

/// One set-based relationship merge over edges of a single shape.
#[derive(Debug, Clone)]
pub struct EdgeMerge<'a> {
    pub shape: &'a EdgeShape,
    pub edges: &'a [EdgeDescriptor],
    pub stamp: DateTime<Utc>,
}

/// An open transaction. Nothing it writes is visible until [`commit`](GraphTxn::commit).
#[allow(async_fn_in_trait)]
pub trait GraphTxn: Send {
    async fn upsert_nodes(&mut self, op: &NodeUpsert<'_>) -> Result<BatchSummary>;

    /// Endpoints are matched, never created; descriptors whose endpoints are
    /// missing are counted in `relationships_skipped`.
    async fn merge_edges(&mut self, op: &EdgeMerge<'_>) -> Result<BatchSummary>;

    /// Detach-delete up to `limit` arbitrary nodes, returning how many went.
    async fn delete_any(&mut self, limit: usize) -> Result<u64>;

    /// Internal ids of every node matching `(label, prop = value)` plus every
    /// node reachable from them over any number of hops in either direction.
    async fn subgraph_ids(&mut self, label: &str, prop: &str, value: &str) -> Result<Vec<i64>>;

    async fn delete_ids(&mut self, ids: &[i64]) -> Result<u64>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Trait representing a graph database backend.
///
/// A driver is the long-lived session handle of a load: it is shared serially
/// by every batch, and each batch holds it only for its own transaction.
#[allow(async_fn_in_trait)]
pub trait GraphDriver: Send + Sync {
    type Txn: GraphTxn;

    /// Verify connectivity to the database.
    async fn ping(&self) -> Result<()>;

    async fn begin(&self) -> Result<Self::Txn>;

    /// Close the connection pool / session.
    async fn close(&self) -> Result<()>;
}

/// Commit `txn` when `result` is `Ok`, roll it back otherwise.
///
/// A failed rollback is logged; the original error is the one returned.
pub async fn finish<T: GraphTxn, V>(txn: T, result: Result<V>) -> Result<V> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
