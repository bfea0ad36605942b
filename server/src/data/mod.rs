//! Data storage layer
//!
//! - `duckdb` - Span store: schema, write pipeline, read pool, archival
//! - `types` - Row, filter and aggregate types shared with ingest and the API

pub mod duckdb;
pub mod types;

pub use duckdb::{DuckdbService, ReadPool, WritePipeline};
