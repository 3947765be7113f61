//! Loader configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{LoaderError, Result};
use crate::nodes::DEFAULT_ID_FIELD;
use crate::pipeline::RetryPolicy;
use crate::reader::DEFAULT_CHUNK_SIZE;

/// Default rows deleted per full-wipe round.
pub const DEFAULT_WIPE_BATCH_SIZE: usize = 10_000;
/// Default node ids deleted per subgraph-wipe sub-batch.
pub const DEFAULT_SUBGRAPH_BATCH_SIZE: usize = 5_000;

/// Central configuration loaded from environment variables.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct LoaderConfig {
    /// Neo4j connection URI (e.g. `bolt://localhost:7687`).
    #[validate(length(min = 1))]
    pub neo4j_uri: String,

    /// Neo4j username. Sent only together with a password.
    pub neo4j_user: Option<String>,

    /// Never serialized, and redacted from `Debug` output.
    #[serde(skip_serializing)]
    pub neo4j_password: Option<String>,

    /// Target database; the server default when unset.
    pub neo4j_database: Option<String>,

    /// Identifying property every entity is merged on.
    #[validate(length(min = 1))]
    pub id_field: String,

    /// Column dropped from every record before upsert.
    pub subgraph_col: Option<String>,

    #[validate(range(min = 1))]
    pub chunk_size: usize,

    /// Attempts per relationship batch, the first one included.
    #[validate(range(min = 1))]
    pub max_retries: u32,

    pub retry_interval_ms: u64,

    #[validate(range(min = 1))]
    pub wipe_batch_size: usize,

    #[validate(range(min = 1))]
    pub subgraph_batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: None,
            neo4j_password: None,
            neo4j_database: None,
            id_field: DEFAULT_ID_FIELD.to_string(),
            subgraph_col: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 3,
            retry_interval_ms: 500,
            wipe_batch_size: DEFAULT_WIPE_BATCH_SIZE,
            subgraph_batch_size: DEFAULT_SUBGRAPH_BATCH_SIZE,
        }
    }
}

impl fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("neo4j_uri", &self.neo4j_uri)
            .field("neo4j_user", &self.neo4j_user)
            .field("neo4j_password", &self.neo4j_password.as_ref().map(|_| "<redacted>"))
            .field("neo4j_database", &self.neo4j_database)
            .field("id_field", &self.id_field)
            .field("subgraph_col", &self.subgraph_col)
            .field("chunk_size", &self.chunk_size)
            .field("max_retries", &self.max_retries)
            .field("retry_interval_ms", &self.retry_interval_ms)
            .field("wipe_batch_size", &self.wipe_batch_size)
            .field("subgraph_batch_size", &self.subgraph_batch_size)
            .finish()
    }
}

impl LoaderConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent),
    /// then reads each variable from the process environment, falling back to
    /// [`LoaderConfig::default`]. A numeric variable that does not parse yields
    /// a [`LoaderError::Validation`] naming it.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(defaults.neo4j_uri),
            neo4j_user: non_empty_var("NEO4J_USER"),
            neo4j_password: non_empty_var("NEO4J_PASSWORD"),
            neo4j_database: non_empty_var("NEO4J_DATABASE"),
            id_field: std::env::var("ID_FIELD").unwrap_or(defaults.id_field),
            subgraph_col: non_empty_var("SUBGRAPH_COL"),
            chunk_size: parse_var("CHUNK_SIZE", defaults.chunk_size)?,
            max_retries: parse_var("MAX_RETRIES", defaults.max_retries)?,
            retry_interval_ms: parse_var("RETRY_INTERVAL_MS", defaults.retry_interval_ms)?,
            wipe_batch_size: parse_var("WIPE_BATCH_SIZE", defaults.wipe_batch_size)?,
            subgraph_batch_size: parse_var("SUBGRAPH_BATCH_SIZE", defaults.subgraph_batch_size)?,
        };

        config.check()?;
        Ok(config)
    }

    /// Run the declarative validation rules, mapping failures to
    /// [`LoaderError::Validation`].
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| LoaderError::Validation(e.to_string()))
    }

    /// Retry policy for relationship batches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| {
            LoaderError::Validation(format!("{key} must be a non-negative integer, got '{val}'"))
        }),
        Err(_) => Ok(default),
    }
}
