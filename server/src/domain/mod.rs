//! Domain logic
//!
//! - `traces` - OTLP trace decoding, normalization and ingestion

pub mod traces;

pub use traces::{ExportEncoding, IngestError, TracePipeline};
