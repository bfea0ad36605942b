//! Trace ingestion pipeline
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │ 1.DECODE │──▶│ 2.NORMALIZE │──▶│ 3.ENQUEUE    │
//! │ protobuf │   │ GenAI cols  │   │ write queue  │
//! │ or JSON  │   │             │   │              │
//! │ → tree   │   │ semconv     │   │ (single      │
//! │          │   │ → SpanRow   │   │  writer)     │
//! └──────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! Stages 1 and 2 are pure and run on the caller's task. Stage 3 is the only
//! point where concurrent requests meet.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::decode::{DecodeError, decode_export_request, parse_json_request};
use super::normalize::{SemconvTable, normalize_request};
use crate::data::duckdb::{WriteError, WritePipeline};
use crate::data::types::SpanBatch;

/// Why an export request was not accepted
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid export request: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Wire format of an export request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportEncoding {
    Protobuf,
    Json,
}

/// Decode, normalize and queue OTLP trace exports
#[derive(Clone)]
pub struct TracePipeline {
    writer: Arc<WritePipeline>,
    semconv: Arc<SemconvTable>,
}

impl TracePipeline {
    pub fn new(writer: Arc<WritePipeline>, semconv: Arc<SemconvTable>) -> Self {
        Self { writer, semconv }
    }

    /// Decode and normalize one `ExportTraceServiceRequest` body
    pub fn prepare(&self, body: &[u8], encoding: ExportEncoding) -> Result<SpanBatch, DecodeError> {
        match encoding {
            ExportEncoding::Protobuf => {
                let request = decode_export_request(body)?;
                Ok(normalize_request(&request, &self.semconv))
            }
            ExportEncoding::Json => {
                let document = parse_json_request(body)?;
                Ok(normalize_request(&document.tree()?, &self.semconv))
            }
        }
    }

    /// Queue the spans of one export request; returns how many were queued.
    ///
    /// Returns once the batch is in the write queue, before it is durable.
    pub async fn ingest(
        &self,
        body: &[u8],
        encoding: ExportEncoding,
        cancel: &CancellationToken,
    ) -> Result<usize, IngestError> {
        let batch = self.prepare(body, encoding)?;
        let spans = batch.len();
        tracing::debug!(spans, bytes = body.len(), ?encoding, "Ingesting trace export");
        self.writer.enqueue(batch, cancel).await?;
        Ok(spans)
    }
}
