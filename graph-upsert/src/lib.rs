//! # graph-upsert
//!
//! Idempotent bulk loader from tab-separated row files into a property graph.
//!
//! ## Architecture
//!
//! - **Chunk reader**: streams a file as fixed-size row chunks after detecting its encoding
//! - **Record / relationship extraction**: turns a chunk into entity records and edge descriptors
//! - **Upsert engine**: MERGE-based node and relationship passes with per-chunk transactions and bounded retry
//! - **Deletion engine**: full and subgraph wipes in bounded rounds
//!
//! Everything that talks to the store goes through [`driver::GraphDriver`];
//! [`driver::Neo4jDriver`] speaks Cypher over Bolt and [`driver::MemoryGraph`]
//! keeps the graph in process.

pub mod edges;
pub mod errors;
pub mod model;
pub mod nodes;
pub mod reader;
pub mod summary;
pub mod types;

pub mod driver;

pub mod pipeline;
pub mod utils;
pub mod wipe;

pub use errors::{LoaderError, Result};
pub use pipeline::{Loader, LoadReport, RetryPolicy};
pub use summary::{BatchSummary, WipeReport};
pub use types::LoaderConfig;
