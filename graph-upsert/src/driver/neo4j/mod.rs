//! Neo4j graph driver implementation.
//!
//! Uses `neo4rs` 0.8 for async, pooled Bolt connections. Every batch runs in
//! its own explicit transaction; list parameters are bound once per statement
//! via `UNWIND`.

pub mod cypher;

use std::collections::HashMap;

use neo4rs::{query, ConfigBuilder, Graph, Query, Row, Txn};
use tracing::{debug, info};

use super::{EdgeMerge, GraphDriver, GraphTxn, NodeUpsert};
use crate::errors::{LoaderError, Result};
use crate::summary::BatchSummary;
use crate::types::LoaderConfig;
use crate::utils::format_neo4j_datetime;

/// Pooled Bolt connection shared by every batch of a run.
pub struct Neo4jDriver {
    graph: Graph,
}

impl Neo4jDriver {
    /// Connect using the URI, credentials and database of `config`.
    ///
    /// Credentials are sent only when both user and password are configured.
    pub async fn connect(config: &LoaderConfig) -> Result<Self> {
        let (user, password) = match (&config.neo4j_user, &config.neo4j_password) {
            (Some(user), Some(password)) => (user.as_str(), password.as_str()),
            _ => ("", ""),
        };

        let mut builder = ConfigBuilder::default()
            .uri(config.neo4j_uri.as_str())
            .user(user)
            .password(password);
        if let Some(db) = &config.neo4j_database {
            builder = builder.db(db.as_str());
        }

        let graph = Graph::connect(builder.build()?).await?;
        info!(uri = %config.neo4j_uri, "connected to neo4j");
        Ok(Self { graph })
    }
}

impl GraphDriver for Neo4jDriver {
    type Txn = Neo4jTxn;

    async fn ping(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Neo4jTxn> {
        let txn = self.graph.start_txn().await?;
        Ok(Neo4jTxn { txn })
    }

    async fn close(&self) -> Result<()> {
        // neo4rs releases pooled connections on drop.
        debug!("closing neo4j driver");
        Ok(())
    }
}

/// An explicit Bolt transaction.
pub struct Neo4jTxn {
    txn: Txn,
}

impl Neo4jTxn {
    /// Run `q` and return its first row, draining the rest of the stream.
    async fn single(&mut self, q: Query) -> Result<Row> {
        let mut stream = self.txn.execute(q).await?;
        let mut first = None;
        while let Some(row) = stream.next(self.txn.handle()).await? {
            if first.is_none() {
                first = Some(row);
            }
        }
        first.ok_or_else(|| LoaderError::Driver("statement returned no rows".to_string()))
    }

    /// Decode the `created` / `matched` / `rows` counters of an upsert statement.
    fn counters(row: &Row) -> Result<(u64, u64, u64)> {
        Ok((
            get_count(row, "created")?,
            get_count(row, "matched")?,
            get_count(row, "rows")?,
        ))
    }
}

impl GraphTxn for Neo4jTxn {
    async fn upsert_nodes(&mut self, op: &NodeUpsert<'_>) -> Result<BatchSummary> {
        let records: Vec<HashMap<String, String>> = op
            .records
            .iter()
            .map(|r| {
                r.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .collect();

        let q = query(&cypher::upsert_nodes(op.label, op.id_field, &op.keys))
            .param("records", records)
            .param("now", format_neo4j_datetime(&op.stamp));

        let (created, matched, rows) = Self::counters(&self.single(q).await?)?;
        Ok(BatchSummary {
            nodes_created: created,
            nodes_updated: matched,
            properties_set: rows * (op.keys.len() as u64 + 1),
            ..Default::default()
        })
    }

    async fn merge_edges(&mut self, op: &EdgeMerge<'_>) -> Result<BatchSummary> {
        let edges: Vec<HashMap<String, String>> = op
            .edges
            .iter()
            .map(|e| {
                HashMap::from([
                    ("src_match".to_string(), e.src_match.clone()),
                    ("dst_match".to_string(), e.dst_match.clone()),
                ])
            })
            .collect();

        let q = query(&cypher::merge_edges(op.shape))
            .param("edges", edges)
            .param("now", format_neo4j_datetime(&op.stamp));

        let (created, matched, rows) = Self::counters(&self.single(q).await?)?;
        Ok(BatchSummary {
            relationships_created: created,
            relationships_updated: matched,
            relationships_skipped: (op.edges.len() as u64).saturating_sub(rows),
            properties_set: rows,
            ..Default::default()
        })
    }

    async fn delete_any(&mut self, limit: usize) -> Result<u64> {
        let q = query(cypher::DELETE_ANY).param("limit", limit as i64);
        get_count(&self.single(q).await?, "deleted")
    }

    async fn subgraph_ids(&mut self, label: &str, prop: &str, value: &str) -> Result<Vec<i64>> {
        let q = query(&cypher::subgraph_ids(label, prop)).param("value", value);
        let row = self.single(q).await?;
        row.get::<Vec<i64>>("node_ids")
            .map_err(|e| LoaderError::Driver(format!("decoding node_ids: {e}")))
    }

    async fn delete_ids(&mut self, ids: &[i64]) -> Result<u64> {
        let q = query(cypher::DELETE_IDS).param("ids", ids.to_vec());
        get_count(&self.single(q).await?, "deleted")
    }

    async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

fn get_count(row: &Row, key: &str) -> Result<u64> {
    let n = row
        .get::<i64>(key)
        .map_err(|e| LoaderError::Driver(format!("decoding {key}: {e}")))?;
    Ok(n.max(0) as u64)
}
