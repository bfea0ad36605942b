//! Span query API endpoints
//!
//! Read-only JSON views over the live store. Every handler runs its query
//! under a token that is cancelled if the client goes away.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use super::request_token;
use crate::api::extractors::{SessionPath, TracePath, ValidatedQuery, is_valid_id};
use crate::api::types::{ApiError, default_limit, parse_time_param, validate_limit};
use crate::data::ReadPool;
use crate::data::types::{
    GenAiStats, SessionFilter, SessionSummary, SpanFilter, SpanRow, StatsFilter, StatusCode,
    StorageStats,
};

/// Shared state for query endpoints
#[derive(Clone)]
pub struct QueryState {
    pub pool: Arc<ReadPool>,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SpansQuery {
    pub service_name: Option<String>,
    pub gen_ai_system: Option<String>,
    /// `unset`, `ok` or `error`
    pub status_code: Option<String>,
    /// Inclusive lower bound on start time (epoch ns or RFC 3339)
    pub start_after: Option<String>,
    /// Exclusive upper bound on start time (epoch ns or RFC 3339)
    pub start_before: Option<String>,
    #[serde(default = "default_limit")]
    #[validate(custom(function = "validate_limit"))]
    pub limit: u32,
}

impl SpansQuery {
    fn into_filter(self) -> Result<SpanFilter, ApiError> {
        let status_code = match self.status_code.as_deref() {
            Some(raw) => Some(StatusCode::parse(raw).ok_or_else(|| {
                ApiError::bad_request(
                    "INVALID_STATUS_CODE",
                    format!("Invalid status_code: {}. Use unset, ok or error.", raw),
                )
            })?),
            None => None,
        };

        Ok(SpanFilter {
            start_after: parse_time_param("start_after", &self.start_after)?,
            start_before: parse_time_param("start_before", &self.start_before)?,
            service_name: self.service_name,
            gen_ai_system: self.gen_ai_system,
            status_code,
            limit: Some(self.limit),
        })
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    pub session_id: Option<String>,
    pub start_after: Option<String>,
    pub start_before: Option<String>,
}

impl StatsQuery {
    fn into_filter(self) -> Result<StatsFilter, ApiError> {
        if let Some(ref session_id) = self.session_id
            && !is_valid_id(session_id)
        {
            return Err(ApiError::bad_request(
                "INVALID_SESSION_ID",
                "Invalid session_id",
            ));
        }
        Ok(StatsFilter {
            start_after: parse_time_param("start_after", &self.start_after)?,
            start_before: parse_time_param("start_before", &self.start_before)?,
            session_id: self.session_id,
        })
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionsQuery {
    /// Only count spans from this service
    pub service_name: Option<String>,
    /// Inclusive lower bound on span start time (epoch ns or RFC 3339)
    pub start_after: Option<String>,
    /// Exclusive upper bound on span start time (epoch ns or RFC 3339)
    pub start_before: Option<String>,
    #[serde(default = "default_limit")]
    #[validate(custom(function = "validate_limit"))]
    pub limit: u32,
}

impl SessionsQuery {
    fn into_filter(self) -> Result<SessionFilter, ApiError> {
        Ok(SessionFilter {
            start_after: parse_time_param("start_after", &self.start_after)?,
            start_before: parse_time_param("start_before", &self.start_before)?,
            service_name: self.service_name,
            limit: Some(self.limit),
        })
    }
}

/// All spans of one trace
#[utoipa::path(
    get,
    path = "/api/traces/{trace_id}",
    tag = "traces",
    params(("trace_id" = String, Path, description = "Trace ID (hex)")),
    responses(
        (status = 200, description = "Spans of the trace, earliest first", body = [SpanRow]),
        (status = 404, description = "No spans stored for this trace")
    )
)]
pub async fn get_trace(
    State(state): State<QueryState>,
    TracePath(trace_id): TracePath,
) -> Result<Json<Vec<SpanRow>>, ApiError> {
    let (cancel, _guard) = request_token();
    let spans = state.pool.get_trace(&trace_id, &cancel).await?;
    if spans.is_empty() {
        return Err(ApiError::not_found(
            "TRACE_NOT_FOUND",
            format!("Trace not found: {}", trace_id),
        ));
    }
    Ok(Json(spans))
}

/// All spans of one session
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}/spans",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Spans of the session, earliest first", body = [SpanRow])
    )
)]
pub async fn get_session_spans(
    State(state): State<QueryState>,
    SessionPath(session_id): SessionPath,
) -> Result<Json<Vec<SpanRow>>, ApiError> {
    let (cancel, _guard) = request_token();
    let spans = state.pool.get_session_spans(&session_id, &cancel).await?;
    Ok(Json(spans))
}

/// Session summaries
#[utoipa::path(
    get,
    path = "/api/sessions",
    tag = "sessions",
    params(SessionsQuery),
    responses(
        (status = 200, description = "Sessions, most recently active first", body = [SessionSummary]),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_sessions(
    State(state): State<QueryState>,
    ValidatedQuery(query): ValidatedQuery<SessionsQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let filter = query.into_filter()?;
    let (cancel, _guard) = request_token();
    let sessions = state.pool.list_sessions(filter, &cancel).await?;
    Ok(Json(sessions))
}

/// Search spans
#[utoipa::path(
    get,
    path = "/api/spans",
    tag = "spans",
    params(SpansQuery),
    responses(
        (status = 200, description = "Matching spans, newest first", body = [SpanRow]),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_spans(
    State(state): State<QueryState>,
    ValidatedQuery(query): ValidatedQuery<SpansQuery>,
) -> Result<Json<Vec<SpanRow>>, ApiError> {
    let filter = query.into_filter()?;
    let (cancel, _guard) = request_token();
    let spans = state.pool.query_spans(filter, &cancel).await?;
    Ok(Json(spans))
}

/// Aggregated GenAI usage
#[utoipa::path(
    get,
    path = "/api/genai/stats",
    tag = "genai",
    params(StatsQuery),
    responses(
        (status = 200, description = "Summed usage over matching GenAI spans", body = GenAiStats),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn genai_stats(
    State(state): State<QueryState>,
    ValidatedQuery(query): ValidatedQuery<StatsQuery>,
) -> Result<Json<GenAiStats>, ApiError> {
    let filter = query.into_filter()?;
    let (cancel, _guard) = request_token();
    let stats = state.pool.genai_stats(filter, &cancel).await?;
    Ok(Json(stats))
}

/// Live store statistics
#[utoipa::path(
    get,
    path = "/api/storage/stats",
    tag = "storage",
    responses(
        (status = 200, description = "Span counts, time extent and database size", body = StorageStats)
    )
)]
pub async fn storage_stats(State(state): State<QueryState>) -> Result<Json<StorageStats>, ApiError> {
    let (cancel, _guard) = request_token();
    let stats = state.pool.storage_stats(&cancel).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans_query(status: Option<&str>, after: Option<&str>) -> SpansQuery {
        SpansQuery {
            service_name: Some("web".to_string()),
            gen_ai_system: None,
            status_code: status.map(str::to_string),
            start_after: after.map(str::to_string),
            start_before: None,
            limit: 10,
        }
    }

    #[test]
    fn test_spans_query_into_filter() {
        let filter = spans_query(Some("error"), Some("2000"))
            .into_filter()
            .unwrap();
        assert_eq!(filter.service_name.as_deref(), Some("web"));
        assert_eq!(filter.status_code, Some(StatusCode::Error));
        assert_eq!(filter.start_after, Some(2000));
        assert_eq!(filter.start_before, None);
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn test_spans_query_rejects_unknown_status() {
        assert!(spans_query(Some("failed"), None).into_filter().is_err());
    }

    #[test]
    fn test_spans_query_rejects_bad_time() {
        assert!(spans_query(None, Some("last week")).into_filter().is_err());
    }

    #[test]
    fn test_spans_query_limit_validation() {
        let mut query = spans_query(None, None);
        query.limit = 0;
        assert!(query.validate().is_err());
        query.limit = default_limit();
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_sessions_query_into_filter() {
        let query = SessionsQuery {
            service_name: Some("agent".to_string()),
            start_after: Some("1970-01-01T00:00:01Z".to_string()),
            start_before: None,
            limit: 5,
        };
        assert!(query.validate().is_ok());
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.service_name.as_deref(), Some("agent"));
        assert_eq!(filter.start_after, Some(1_000_000_000));
        assert_eq!(filter.limit, Some(5));

        let bad_time = SessionsQuery {
            service_name: None,
            start_after: None,
            start_before: Some("soon".to_string()),
            limit: 5,
        };
        assert!(bad_time.into_filter().is_err());
    }

    #[test]
    fn test_stats_query_into_filter() {
        let filter = StatsQuery {
            session_id: Some("s1".to_string()),
            start_after: None,
            start_before: Some("1970-01-01T00:00:02Z".to_string()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.session_id.as_deref(), Some("s1"));
        assert_eq!(filter.start_before, Some(2_000_000_000));

        let empty_session = StatsQuery {
            session_id: Some(String::new()),
            start_after: None,
            start_before: None,
        };
        assert!(empty_session.into_filter().is_err());
    }
}
