//! Error types for graph-upsert.

use std::path::PathBuf;

/// Alias for Results returning [`LoaderError`].
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Top-level error type for graph-upsert.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file could not be decoded with the detected encoding.
    #[error("Decode error in {path}: not valid {encoding}")]
    Decode { path: PathBuf, encoding: String },

    /// A row's field count does not match the header.
    #[error("Malformed row in {path} at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        expected: u64,
        found: u64,
    },

    #[error("Reader error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column (the `type` column or the identifying property) is absent.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// The model has no declaration for the requested node, property, or relationship.
    #[error("Schema lookup failed: {0}")]
    SchemaLookup(String),

    #[error("Model file error: {0}")]
    Model(#[from] serde_yaml::Error),

    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Driver error: {0}")]
    Driver(String),

    /// A relationship batch failed on every permitted attempt.
    #[error("Batch {batch} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        batch: usize,
        attempts: u32,
        #[source]
        source: Box<LoaderError>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoaderError {
    /// Shorthand for a [`LoaderError::SchemaLookup`].
    pub(crate) fn lookup(msg: impl Into<String>) -> Self {
        Self::SchemaLookup(msg.into())
    }
}
