//! Data-model lookups.
//!
//! The loader never reads schema files directly; it asks a [`ModelIndex`]
//! which relationship connects two entity types and how the type hierarchy is
//! shaped. [`mdf::MdfModel`] implements it over MDF model/property YAML files.

pub mod mdf;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{LoaderError, Result};

pub use mdf::MdfModel;

/// Cardinality of a declared relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Multiplicity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Multiplicity {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one_to_one" => Ok(Self::OneToOne),
            "one_to_many" => Ok(Self::OneToMany),
            "many_to_one" => Ok(Self::ManyToOne),
            "many_to_many" => Ok(Self::ManyToMany),
            other => Err(LoaderError::lookup(format!("unknown multiplicity '{other}'"))),
        }
    }
}

/// Read-only view of the data model consumed by the loader.
///
/// Every lookup fails with [`LoaderError::SchemaLookup`] when the requested
/// type, property, or relationship is not declared.
pub trait ModelIndex: Send + Sync {
    /// Name of the relationship declared from `src` to `dst`.
    fn edge_handle(&self, src: &str, dst: &str) -> Result<&str>;

    fn multiplicity(&self, src: &str, dst: &str) -> Result<Multiplicity>;

    /// Types that `node` points to.
    fn parents(&self, node: &str) -> Result<BTreeSet<String>>;

    /// Types that point to `node`.
    fn children(&self, node: &str) -> Result<BTreeSet<String>>;

    /// The single type without parents.
    fn root(&self) -> Result<&str>;

    fn required_props(&self, node: &str) -> Result<BTreeSet<String>>;

    fn key_prop(&self, node: &str) -> Result<&str>;

    /// Permissible values of an enumerated property, `None` for free text.
    fn permissible_values(&self, node: &str, prop: &str) -> Result<Option<&[String]>>;
}
