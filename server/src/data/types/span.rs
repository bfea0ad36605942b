//! Span row types shared by the ingest and read paths

use serde::Serialize;

use super::{SpanKind, StatusCode};

/// One persisted span, keyed by `(trace_id, span_id)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SpanRow {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub trace_state: Option<String>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    /// `end - start`, clamped to 0
    pub duration_ns: u64,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub service_name: String,
    pub session_id: Option<String>,
    pub gen_ai_system: Option<String>,
    pub gen_ai_request_model: Option<String>,
    pub gen_ai_response_model: Option<String>,
    pub gen_ai_input_tokens: Option<i64>,
    pub gen_ai_output_tokens: Option<i64>,
    pub gen_ai_cost_usd: Option<f64>,
    pub gen_ai_tool_name: Option<String>,
    /// JSON object of attributes not promoted to a column
    pub attributes_json: String,
    /// JSON array of span events, `None` when the span has none
    pub events_json: Option<String>,
}

/// Rows produced from one export request, committed atomically.
/// An empty batch is a no-op.
pub type SpanBatch = Vec<SpanRow>;
