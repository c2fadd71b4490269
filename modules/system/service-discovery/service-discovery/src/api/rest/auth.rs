use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::Problem;
use crate::infra::http::API_KEY_HEADER;

/// Rejects requests whose `X-Api-Key` header does not match `expected`.
pub async fn require_api_key(
    State(expected): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == &*expected);

    if !authorized {
        tracing::debug!(uri = %request.uri(), "rejected request without valid API key");
        return Problem::unauthorized().into_response();
    }
    next.run(request).await
}
