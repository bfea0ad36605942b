//! OTLP/HTTP trace export endpoint
//!
//! Accepts binary protobuf and OTLP/JSON; the response uses the request's
//! encoding. Gzip request bodies are inflated by the router's decompression
//! layer before they reach the handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::request_token;
use crate::api::types::ApiError;
use crate::domain::{ExportEncoding, TracePipeline};
use crate::utils::traceparent::TraceContext;

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
const JSON_CONTENT_TYPE: &str = "application/json";
const TRACEPARENT_HEADER: &str = "traceparent";

#[derive(Clone)]
pub struct OtlpState {
    pub pipeline: TracePipeline,
}

/// Encoding declared by the content type; `None` when we cannot decode it.
/// A missing content type means protobuf.
fn export_encoding(headers: &HeaderMap) -> Option<ExportEncoding> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Some(ExportEncoding::Protobuf);
    };
    let ct = value.to_str().ok()?;
    let mime = ct.split(';').next().unwrap_or("").trim();
    if mime.eq_ignore_ascii_case(PROTOBUF_CONTENT_TYPE)
        || mime.eq_ignore_ascii_case("application/protobuf")
    {
        Some(ExportEncoding::Protobuf)
    } else if mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        Some(ExportEncoding::Json)
    } else {
        None
    }
}

/// Empty `ExportTraceServiceResponse` in the request's encoding
fn export_response(encoding: ExportEncoding) -> Response {
    match encoding {
        // Encodes to zero bytes
        ExportEncoding::Protobuf => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
            Bytes::new(),
        )
            .into_response(),
        ExportEncoding::Json => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            Bytes::from_static(b"{}"),
        )
            .into_response(),
    }
}

/// Log the caller's trace context, if it sent a valid one
fn log_caller_context(headers: &HeaderMap) {
    let Some(value) = headers.get(TRACEPARENT_HEADER) else {
        return;
    };
    match TraceContext::parse_utf8(value.as_bytes()) {
        Some(ctx) => tracing::debug!(
            trace_id = %ctx.trace_id_hex(),
            parent_id = %ctx.parent_id_hex(),
            sampled = ctx.is_sampled(),
            "Export request carries trace context"
        ),
        None => tracing::trace!("Ignoring invalid traceparent header"),
    }
}

/// `POST /v1/traces`
pub async fn export(State(state): State<OtlpState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(encoding) = export_encoding(&headers) else {
        return ApiError::unsupported_media_type(format!(
            "Unsupported content type; send {} or {}",
            PROTOBUF_CONTENT_TYPE, JSON_CONTENT_TYPE
        ))
        .into_response();
    };
    log_caller_context(&headers);

    let (cancel, _guard) = request_token();
    match state.pipeline.ingest(&body, encoding, &cancel).await {
        Ok(_) => export_response(encoding),
        Err(e) => ApiError::from_ingest(e).into_response(),
    }
}
