//! OTLP trace ingestion
//!
//! - `decode` - protobuf and JSON decoding of `ExportTraceServiceRequest`
//! - `normalize` - decoded spans to flat storage rows
//! - `pipeline` - decode, normalize and enqueue

pub mod decode;
pub mod normalize;
mod pipeline;

#[cfg(test)]
pub(crate) mod fixtures;

pub use pipeline::{ExportEncoding, IngestError, TracePipeline};
