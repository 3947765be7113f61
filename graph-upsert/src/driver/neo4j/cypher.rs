//! Cypher statement text for every write the loader performs.
//!
//! Labels, property names, and relationship types are interpolated as quoted
//! identifiers; all values travel as parameters. `$now` carries the batch
//! stamp so created and matched entities can be told apart in the result.

use crate::edges::EdgeShape;
use crate::utils::quote_identifier;

/// Set-based node upsert over `$records`.
pub fn upsert_nodes(label: &str, id_field: &str, keys: &[&str]) -> String {
    let node = quote_identifier(label);
    let id = quote_identifier(id_field);
    let set_clause: String = keys
        .iter()
        .map(|k| {
            let k = quote_identifier(k);
            format!("n.{k} = record.{k}, ")
        })
        .collect();

    format!(
        "UNWIND $records AS record
MERGE (n:{node} {{{id}: record.{id}}})
ON CREATE SET {set_clause}n.created = datetime($now)
ON MATCH SET {set_clause}n.updated = datetime($now)
RETURN count(DISTINCT CASE WHEN n.created = datetime($now) THEN n END) AS created,
       count(DISTINCT CASE WHEN n.created <> datetime($now) THEN n END) AS matched,
       count(n) AS rows"
    )
}

/// Set-based relationship merge over `$edges` of one shape.
pub fn merge_edges(shape: &EdgeShape) -> String {
    let src = quote_identifier(&shape.src_label);
    let src_prop = quote_identifier(&shape.src_prop);
    let dst = quote_identifier(&shape.dst_label);
    let dst_prop = quote_identifier(&shape.dst_prop);
    let handle = quote_identifier(&shape.handle);

    format!(
        "UNWIND $edges AS edge
MATCH (src:{src} {{{src_prop}: edge.src_match}})
MATCH (dst:{dst} {{{dst_prop}: edge.dst_match}})
MERGE (src)-[r:{handle}]->(dst)
ON CREATE SET r.created = datetime($now)
ON MATCH SET r.updated = datetime($now)
RETURN count(DISTINCT CASE WHEN r.created = datetime($now) THEN r END) AS created,
       count(DISTINCT CASE WHEN r.created <> datetime($now) THEN r END) AS matched,
       count(r) AS rows"
    )
}

pub const DELETE_ANY: &str = "MATCH (n)
WITH n LIMIT $limit
DETACH DELETE n
RETURN count(n) AS deleted";

pub const DELETE_IDS: &str = "MATCH (n)
WHERE id(n) IN $ids
DETACH DELETE n
RETURN count(n) AS deleted";

/// Ids of the root(s) matching `$value` and everything connected to them.
pub fn subgraph_ids(label: &str, prop: &str) -> String {
    let root = quote_identifier(label);
    let prop = quote_identifier(prop);
    format!(
        "MATCH (s:{root} {{{prop}: $value}})
OPTIONAL MATCH (s)-[*]-(n)
WITH collect(DISTINCT id(s)) + collect(DISTINCT id(n)) AS node_ids
RETURN node_ids"
    )
}
