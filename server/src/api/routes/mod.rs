//! HTTP routes
//!
//! - `otlp` - OTLP/HTTP trace ingestion
//! - `query` - JSON read API
//! - `health` - liveness

pub mod health;
pub mod otlp;
pub mod query;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::data::ReadPool;
use crate::domain::TracePipeline;

/// Token for one request, cancelled when the guard is dropped.
///
/// Handlers hold the guard for their whole body, so a client disconnect
/// (which drops the handler future) cancels whatever the request is waiting on.
pub(crate) fn request_token() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// `POST /v1/traces`
pub fn otlp_routes(pipeline: TracePipeline) -> Router {
    Router::new()
        .route("/v1/traces", post(otlp::export))
        .with_state(otlp::OtlpState { pipeline })
}

/// Query API and health check
pub fn query_routes(pool: Arc<ReadPool>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/traces/{trace_id}", get(query::get_trace))
        .route("/api/sessions", get(query::list_sessions))
        .route(
            "/api/sessions/{session_id}/spans",
            get(query::get_session_spans),
        )
        .route("/api/spans", get(query::list_spans))
        .route("/api/genai/stats", get(query::genai_stats))
        .route("/api/storage/stats", get(query::storage_stats))
        .with_state(query::QueryState { pool })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::data::DuckdbService;
    use crate::data::duckdb::span_repository;
    use crate::data::duckdb::test_support::sample_row;

    fn router() -> (DuckdbService, Arc<ReadPool>, Router) {
        let service = DuckdbService::open_in_memory().unwrap();
        let mut genai = sample_row("t1", "s2", 2_000);
        genai.session_id = Some("sess".to_string());
        genai.gen_ai_system = Some("openai".to_string());
        genai.gen_ai_input_tokens = Some(10);
        genai.gen_ai_output_tokens = Some(5);
        genai.gen_ai_cost_usd = Some(0.5);
        service
            .with_conn(|conn| {
                span_repository::upsert_batch(conn, &[sample_row("t1", "s1", 1_000), genai])
            })
            .unwrap();
        let pool = Arc::new(ReadPool::new(&service, 2).unwrap());
        let router = query_routes(Arc::clone(&pool));
        (service, pool, router)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_request_token_cancelled_on_drop() {
        let (token, guard) = request_token();
        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_get_trace_route() {
        let (_service, _pool, router) = router();
        let (status, body) = get_json(router.clone(), "/api/traces/t1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["span_id"], "s1");

        let (status, body) = get_json(router, "/api/traces/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "TRACE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_session_and_stats_routes() {
        let (_service, _pool, router) = router();
        let (status, body) = get_json(router.clone(), "/api/sessions/sess/spans").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = get_json(router, "/api/genai/stats?session_id=sess").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request_count"], 1);
        assert_eq!(body["total_input_tokens"], 10);
        assert_eq!(body["total_output_tokens"], 5);
    }

    #[tokio::test]
    async fn test_list_sessions_route() {
        let (_service, _pool, router) = router();
        let (status, body) = get_json(router.clone(), "/api/sessions").await;
        assert_eq!(status, StatusCode::OK);
        let sessions = body.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["session_id"], "sess");
        assert_eq!(sessions[0]["span_count"], 1);
        assert_eq!(sessions[0]["genai_request_count"], 1);
        assert_eq!(sessions[0]["total_input_tokens"], 10);
        assert_eq!(sessions[0]["total_cost_usd"], 0.5);
        assert_eq!(sessions[0]["services"], serde_json::json!(["svc"]));

        let (status, body) = get_json(router.clone(), "/api/sessions?service_name=other").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, body) = get_json(router, "/api/sessions?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_storage_stats_route() {
        let (_service, _pool, router) = router();
        let (status, body) = get_json(router, "/api/storage/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["span_count"], 2);
        assert_eq!(body["trace_count"], 1);
        assert_eq!(body["session_count"], 1);
        assert_eq!(body["oldest_span_unix_nano"], 1_000);
        assert_eq!(body["newest_span_unix_nano"], 2_000);
        assert!(body["database_size_bytes"].is_u64());
    }

    #[tokio::test]
    async fn test_list_spans_route_filters() {
        let (_service, _pool, router) = router();
        let (status, body) = get_json(router.clone(), "/api/spans?gen_ai_system=openai").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["span_id"], "s2");

        let (status, body) = get_json(router.clone(), "/api/spans?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = get_json(router, "/api/spans?status_code=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATUS_CODE");
    }

    #[tokio::test]
    async fn test_health_reports_shutdown() {
        let (_service, pool, router) = router();
        let (status, body) = get_json(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["read_pool_size"], 2);

        pool.close();
        let (status, _) = get_json(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, body) = get_json(router, "/api/traces/t1").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    }
}
