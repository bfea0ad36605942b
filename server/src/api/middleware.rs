//! HTTP fallback handling

use axum::extract::Request;
use axum::http::header;
use axum::response::IntoResponse;

use super::types::ApiError;

/// Handle 404 Not Found with logging.
///
/// Exporters pointed at a wrong path (for example `/v1/metrics`) show up
/// here, so the request line and content type are logged at debug level.
pub async fn handle_404(req: Request) -> impl IntoResponse {
    let method = req.method();
    let uri = req.uri();
    tracing::debug!(
        %method,
        %uri,
        content_type = ?req.headers().get(header::CONTENT_TYPE),
        "[404] No route"
    );
    ApiError::not_found("NOT_FOUND", format!("No route for {} {}", method, uri.path()))
}
