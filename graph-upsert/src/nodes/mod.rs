//! Entity records and their extraction from row chunks.
//!
//! An [`EntityRecord`] is a flat, ordered property map. Which properties a
//! record carries is decided per chunk from the header, never from a fixed
//! struct, because optional columns vary from file to file.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::reader::{is_relationship_column, Chunk, TYPE_COLUMN};

/// Default identifying property of every entity type.
pub const DEFAULT_ID_FIELD: &str = "guid";

/// Flat property map of one entity. All values are text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    properties: BTreeMap<String, String>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Identifier value under `id_field`, if present.
    pub fn id(&self, id_field: &str) -> Option<&str> {
        self.get(id_field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EntityRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The records of one chunk, tagged with their shared entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    pub entity_type: String,
    pub records: Vec<EntityRecord>,
}

impl RecordBatch {
    /// Union of property keys over every record in the batch.
    pub fn property_keys(&self) -> BTreeSet<&str> {
        self.records.iter().flat_map(EntityRecord::keys).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Convert a chunk into entity records.
///
/// The entity type comes from the first row. The `type` column, the optional
/// subgraph tag column, and every relationship column are dropped. Duplicate
/// identifiers are passed through untouched; the store's MERGE resolves them.
pub fn extract_records(chunk: &Chunk, subgraph_col: Option<&str>) -> Result<RecordBatch> {
    let entity_type = chunk.entity_type()?.to_string();

    let keep: Vec<usize> = chunk
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, col)| {
            col.as_str() != TYPE_COLUMN
                && Some(col.as_str()) != subgraph_col
                && !is_relationship_column(col)
        })
        .map(|(i, _)| i)
        .collect();

    let records = chunk
        .rows()
        .map(|row| {
            keep.iter()
                .map(|&i| (chunk.columns()[i].as_str(), row.value_at(i)))
                .collect::<EntityRecord>()
        })
        .collect();

    Ok(RecordBatch {
        entity_type,
        records,
    })
}
