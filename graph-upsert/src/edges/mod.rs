//! Edge descriptors and their extraction from row chunks.
//!
//! A relationship column is named `<parent-type>.<parent-prop>`; every
//! non-empty cell in it becomes one [`EdgeDescriptor`] from the row's entity to
//! the parent entity holding that value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{LoaderError, Result};
use crate::model::ModelIndex;
use crate::reader::{Chunk, RELATIONSHIP_SEPARATOR};

/// One directed, named relationship instance, addressed by how to look up
/// both of its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub src_label: String,
    pub src_prop: String,
    pub src_match: String,
    pub dst_label: String,
    pub dst_prop: String,
    pub dst_match: String,
    /// Relationship name.
    pub handle: String,
}

impl EdgeDescriptor {
    pub fn shape(&self) -> EdgeShape {
        EdgeShape {
            src_label: self.src_label.clone(),
            dst_label: self.dst_label.clone(),
            handle: self.handle.clone(),
            src_prop: self.src_prop.clone(),
            dst_prop: self.dst_prop.clone(),
        }
    }
}

/// Grouping key of edges that can be written by one statement.
///
/// Ordered by `(src_label, dst_label, handle)` first; the endpoint properties
/// only split a group when two relationship columns reach the same parent type
/// through different properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeShape {
    pub src_label: String,
    pub dst_label: String,
    pub handle: String,
    pub src_prop: String,
    pub dst_prop: String,
}

/// Partition descriptors by [`EdgeShape`], keeping source order inside a group.
pub fn group_by_shape(edges: Vec<EdgeDescriptor>) -> BTreeMap<EdgeShape, Vec<EdgeDescriptor>> {
    let mut groups: BTreeMap<EdgeShape, Vec<EdgeDescriptor>> = BTreeMap::new();
    for edge in edges {
        groups.entry(edge.shape()).or_default().push(edge);
    }
    groups
}

/// Split `parent.prop` into `(parent, prop)`.
///
/// Only the first two segments count: `a.b.c` addresses property `b` of `a`.
pub fn split_relationship_column(column: &str) -> Option<(&str, &str)> {
    let mut segments = column.split(RELATIONSHIP_SEPARATOR);
    let parent = segments.next().filter(|s| !s.is_empty())?;
    let prop = segments.next().filter(|s| !s.is_empty())?;
    Some((parent, prop))
}

/// Extract every edge descriptor a chunk encodes.
///
/// A chunk without relationship columns (the root type's file) yields an empty
/// list. A relationship column whose parent type has no declared relationship
/// from the chunk's type fails the whole chunk.
pub fn extract_relationships<M>(chunk: &Chunk, model: &M, id_field: &str) -> Result<Vec<EdgeDescriptor>>
where
    M: ModelIndex + ?Sized,
{
    let columns: Vec<&str> = chunk.relationship_columns().collect();
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let src_label = chunk.entity_type()?;
    if chunk.column_index(id_field).is_none() {
        return Err(LoaderError::MissingColumn(id_field.to_string()));
    }

    let mut edges = Vec::new();
    for column in columns {
        let (dst_label, dst_prop) = split_relationship_column(column).ok_or_else(|| {
            LoaderError::lookup(format!("malformed relationship column '{column}'"))
        })?;
        let handle = model.edge_handle(src_label, dst_label)?;

        for row in chunk.rows() {
            let dst_match = row.get_or_empty(column);
            if dst_match.is_empty() {
                continue;
            }
            edges.push(EdgeDescriptor {
                src_label: src_label.to_string(),
                src_prop: id_field.to_string(),
                src_match: row.get_or_empty(id_field).to_string(),
                dst_label: dst_label.to_string(),
                dst_prop: dst_prop.to_string(),
                dst_match: dst_match.to_string(),
                handle: handle.to_string(),
            });
        }
    }
    Ok(edges)
}
