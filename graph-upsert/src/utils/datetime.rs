//! Timestamp formatting for Neo4j `datetime()` parameters.

use chrono::{DateTime, Utc};

/// Format a [`DateTime<Utc>`] as a string Cypher's `datetime()` accepts.
///
/// Output format: `"2024-01-15T10:30:00.000000000Z"` (ISO 8601, nanosecond precision, UTC).
/// The fixed precision keeps equal instants textually equal, which the upsert
/// statements rely on when they compare a node's `created` against the batch stamp.
pub fn format_neo4j_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}
