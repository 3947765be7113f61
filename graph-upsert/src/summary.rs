//! Write-effect counters.
//!
//! A [`BatchSummary`] is produced for every committed write and combined by
//! elementwise addition, so totals never depend on the order in which batches
//! or edge groups were written.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Counters describing the effect of one or more write operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Nodes that did not exist before the write.
    pub nodes_created: u64,
    /// Pre-existing nodes that were matched and had their properties re-set.
    pub nodes_updated: u64,
    /// Property assignments performed, timestamps included.
    pub properties_set: u64,
    pub relationships_created: u64,
    /// Relationships that already existed and only received an `updated` stamp.
    pub relationships_updated: u64,
    /// Edge descriptors dropped because one of their endpoints does not exist.
    pub relationships_skipped: u64,
}

impl BatchSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for BatchSummary {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for BatchSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_created += rhs.nodes_created;
        self.nodes_updated += rhs.nodes_updated;
        self.properties_set += rhs.properties_set;
        self.relationships_created += rhs.relationships_created;
        self.relationships_updated += rhs.relationships_updated;
        self.relationships_skipped += rhs.relationships_skipped;
    }
}

impl Sum for BatchSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Outcome of a full or subgraph wipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeReport {
    /// Nodes deleted across all rounds.
    pub deleted: u64,
    /// Rounds that deleted at least one node.
    pub rounds: u64,
    /// Nodes resolved before deletion started (subgraph wipe only).
    pub matched: u64,
}
