//! OpenAPI document and Swagger UI

use axum::http::header;
use axum::response::{Html, IntoResponse, Json};
use utoipa::OpenApi;

use crate::api::routes::{health, query};
use crate::data::types::{
    GenAiStats, SessionSummary, SpanKind, SpanRow, StatusCode, StorageStats,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Qyl Collector API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Read API over spans collected from OTLP exporters"
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "traces", description = "Trace queries"),
        (name = "spans", description = "Span search"),
        (name = "sessions", description = "Session queries"),
        (name = "genai", description = "GenAI usage statistics"),
        (name = "storage", description = "Live store statistics")
    ),
    paths(
        health::health,
        query::get_trace,
        query::list_sessions,
        query::get_session_spans,
        query::list_spans,
        query::genai_stats,
        query::storage_stats,
    ),
    components(schemas(
        health::HealthResponse,
        SpanRow,
        SpanKind,
        StatusCode,
        GenAiStats,
        SessionSummary,
        StorageStats,
    ))
)]
pub struct ApiDoc;

/// Serve the OpenAPI JSON document
pub async fn openapi_json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Json(ApiDoc::openapi()),
    )
}

/// Serve Swagger UI from CDN
pub async fn swagger_ui_html() -> Html<&'static str> {
    Html(SWAGGER_UI_HTML)
}

const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Qyl Collector API</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        html { box-sizing: border-box; overflow-y: scroll; }
        *, *:before, *:after { box-sizing: inherit; }
        body { margin: 0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = () => {
            window.ui = SwaggerUIBundle({
                url: "/api/openapi.json",
                dom_id: '#swagger-ui',
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout",
                deepLinking: true,
                showExtensions: true,
                showCommonExtensions: true
            });
        };
    </script>
</body>
</html>"#;
