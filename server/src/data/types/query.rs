//! Read path parameters and aggregate results

use serde::Serialize;

use super::StatusCode;

/// Optional span filters, AND-combined; `None` matches everything.
///
/// The time window is half-open: `start_after <= start < start_before`.
#[derive(Debug, Clone, Default)]
pub struct SpanFilter {
    pub service_name: Option<String>,
    pub gen_ai_system: Option<String>,
    pub status_code: Option<StatusCode>,
    pub start_after: Option<u64>,
    pub start_before: Option<u64>,
    pub limit: Option<u32>,
}

/// Filters for GenAI usage aggregation
#[derive(Debug, Clone, Default)]
pub struct StatsFilter {
    pub session_id: Option<String>,
    pub start_after: Option<u64>,
    pub start_before: Option<u64>,
}

/// Summed GenAI usage over the matching spans
#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct GenAiStats {
    pub request_count: u64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_usd: f64,
}

/// Filters for the session listing. Time bounds and service apply per span,
/// so the totals cover only the matching spans of each session.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub service_name: Option<String>,
    pub start_after: Option<u64>,
    pub start_before: Option<u64>,
    pub limit: Option<u32>,
}

/// One session rolled up from its spans
#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SessionSummary {
    pub session_id: String,
    pub span_count: u64,
    pub trace_count: u64,
    pub error_count: u64,
    /// Earliest span start
    pub first_start_unix_nano: u64,
    /// Latest span end
    pub last_end_unix_nano: u64,
    pub services: Vec<String>,
    pub models: Vec<String>,
    pub genai_request_count: u64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_usd: f64,
}

/// Size and extent of the live store
#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct StorageStats {
    pub span_count: u64,
    pub trace_count: u64,
    pub session_count: u64,
    /// Bytes in use by the database file; 0 for in-memory stores
    pub database_size_bytes: u64,
    /// `None` when the store is empty
    pub oldest_span_unix_nano: Option<u64>,
    pub newest_span_unix_nano: Option<u64>,
}
