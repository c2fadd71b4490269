use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use service_discovery_sdk::ServiceDiscoveryClient;
use tower_http::trace::TraceLayer;

use super::{auth, handlers};

/// Registry HTTP routes. Everything under `/nodes` requires the API key.
///
/// `GET /nodes/{key}` lists one service and `DELETE /nodes/{key}` removes
/// one node; both share the segment so the router sees a single parameter.
pub fn router(client: Arc<dyn ServiceDiscoveryClient>, api_key: &str) -> Router {
    let expected: Arc<str> = Arc::from(api_key);

    let nodes = Router::new()
        .route("/nodes", post(handlers::register).get(handlers::list_all))
        .route(
            "/nodes/{key}",
            get(handlers::list_service).delete(handlers::deregister),
        )
        .route_layer(middleware::from_fn_with_state(
            expected,
            auth::require_api_key,
        ))
        .with_state(client);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(nodes)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<axum::body::Body>| {
                tracing::info_span!(
                    "http_api",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
}
