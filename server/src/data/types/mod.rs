//! Shared data types
//!
//! Row, filter and aggregate types used by the DuckDB layer, the ingest
//! normalizer and the query API.

mod enums;
mod query;
mod span;

pub use enums::{SpanKind, StatusCode};
pub use query::{
    GenAiStats, SessionFilter, SessionSummary, SpanFilter, StatsFilter, StorageStats,
};
pub use span::{SpanBatch, SpanRow};
