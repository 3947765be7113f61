//! Deletion engine.
//!
//! Both wipes delete in bounded rounds, each round its own committed
//! transaction, so no single transaction grows with the size of the graph.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::driver::{finish, GraphDriver, GraphTxn};
use crate::errors::{LoaderError, Result};
use crate::summary::WipeReport;

/// Detach-delete every node, `batch_size` at a time, until a round deletes
/// nothing.
///
/// An empty database costs exactly one round. The final, empty round is not
/// counted in [`WipeReport::rounds`].
pub async fn wipe_database<D: GraphDriver>(driver: &D, batch_size: usize) -> Result<WipeReport> {
    if batch_size == 0 {
        return Err(LoaderError::Validation("wipe batch size must be > 0".to_string()));
    }

    let mut report = WipeReport::default();
    loop {
        let mut txn = driver.begin().await?;
        let result = txn.delete_any(batch_size).await;
        let deleted = finish(txn, result).await?;
        if deleted == 0 {
            break;
        }
        report.deleted += deleted;
        report.rounds += 1;
        info!(round = report.rounds, deleted, total = report.deleted, "wipe round committed");
    }

    info!(deleted = report.deleted, rounds = report.rounds, "database wiped");
    Ok(report)
}

/// Delete the node(s) with `label.prop = value` and everything connected to
/// them, in sub-batches of `batch_size` ids.
///
/// The subgraph is resolved once, up front. A root that does not exist
/// deletes nothing.
pub async fn wipe_subgraph<D: GraphDriver>(
    driver: &D,
    label: &str,
    prop: &str,
    value: &str,
    batch_size: usize,
) -> Result<WipeReport> {
    if batch_size == 0 {
        return Err(LoaderError::Validation("subgraph batch size must be > 0".to_string()));
    }

    let mut txn = driver.begin().await?;
    let result = txn.subgraph_ids(label, prop, value).await;
    let ids = finish(txn, result).await?;

    let mut seen = BTreeSet::new();
    let ids: Vec<i64> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

    let mut report = WipeReport {
        matched: ids.len() as u64,
        ..Default::default()
    };
    info!(label, prop, value, matched = report.matched, "subgraph resolved");

    for sub_batch in ids.chunks(batch_size) {
        let mut txn = driver.begin().await?;
        let result = txn.delete_ids(sub_batch).await;
        let deleted = finish(txn, result).await?;
        if deleted == 0 {
            warn!(
                label,
                value,
                remaining = report.matched - report.deleted,
                "sub-batch deleted nothing, stopping"
            );
            break;
        }
        report.deleted += deleted;
        report.rounds += 1;
        info!(round = report.rounds, deleted, total = report.deleted, "subgraph round committed");
    }

    Ok(report)
}
