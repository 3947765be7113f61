//! Small shared helpers.

pub mod datetime;
pub mod text;

pub use datetime::format_neo4j_datetime;
pub use text::quote_identifier;
