//! Shared API types
//!
//! Error responses for the query API and the OTLP/HTTP ingestion endpoint.

use axum::Json;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use validator::ValidationError;

use crate::core::constants::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, RETRY_AFTER_SECS};
use crate::data::duckdb::{ReadError, WriteError};
use crate::domain::IngestError;
use crate::domain::traces::decode::DecodeError;
use crate::utils::time::parse_time_bound;

/// Parse an optional time bound (epoch nanoseconds or RFC 3339)
pub fn parse_time_param(name: &str, value: &Option<String>) -> Result<Option<u64>, ApiError> {
    match value {
        Some(raw) => parse_time_bound(raw).map(Some).ok_or_else(|| {
            ApiError::bad_request(
                "INVALID_TIMESTAMP",
                format!(
                    "Invalid {}: {}. Use epoch nanoseconds or RFC 3339.",
                    name, raw
                ),
            )
        }),
        None => Ok(None),
    }
}

pub fn default_limit() -> u32 {
    DEFAULT_QUERY_LIMIT
}

/// Validator function for the span query limit
pub fn validate_limit(limit: u32) -> Result<(), ValidationError> {
    if limit == 0 || limit > MAX_QUERY_LIMIT {
        return Err(ValidationError::new("limit_range")
            .with_message(format!("Limit must be between 1 and {}", MAX_QUERY_LIMIT).into()));
    }
    Ok(())
}

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    RequestTimeout { message: String },
    UnsupportedMediaType { message: String },
    ServiceUnavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::UnsupportedMediaType {
            message: message.into(),
        }
    }

    pub fn from_read(e: ReadError) -> Self {
        match e {
            ReadError::Cancelled => Self::RequestTimeout {
                message: "Query cancelled".to_string(),
            },
            ReadError::ShutDown => Self::service_unavailable("Service is shutting down"),
            ReadError::Store(e) => {
                tracing::error!(error = %e, "DuckDB read failed");
                Self::internal("Database operation failed")
            }
        }
    }

    pub fn from_ingest(e: IngestError) -> Self {
        match e {
            IngestError::Decode(e) => {
                tracing::debug!(error = %e, "Rejected malformed export request");
                let code = match e {
                    DecodeError::InvalidJson(_) => "INVALID_JSON",
                    _ => "INVALID_PROTOBUF",
                };
                Self::bad_request(code, e.to_string())
            }
            IngestError::Write(WriteError::Cancelled) => Self::RequestTimeout {
                message: "Export cancelled".to_string(),
            },
            IngestError::Write(WriteError::ShutDown) => {
                Self::service_unavailable("Service is shutting down")
            }
            IngestError::Write(WriteError::Store(e)) => {
                tracing::error!(error = %e, "Span write failed");
                Self::internal("Failed to store spans")
            }
        }
    }
}

impl From<ReadError> for ApiError {
    fn from(e: ReadError) -> Self {
        Self::from_read(e)
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        Self::from_ingest(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = matches!(self, Self::ServiceUnavailable { .. });
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::RequestTimeout { message } => (
                StatusCode::REQUEST_TIMEOUT,
                "request_timeout",
                "CANCELLED".to_string(),
                message,
            ),
            Self::UnsupportedMediaType { message } => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                "UNSUPPORTED_MEDIA_TYPE".to_string(),
                message,
            ),
            Self::ServiceUnavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "SERVICE_UNAVAILABLE".to_string(),
                message,
            ),
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        let body = Json(serde_json::json!({
            "error": error_type,
            "code": code,
            "message": message
        }));

        if retry_after {
            (
                status,
                [(
                    HeaderName::from_static("retry-after"),
                    RETRY_AFTER_SECS.to_string(),
                )],
                body,
            )
                .into_response()
        } else {
            (status, body).into_response()
        }
    }
}
