use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use service_discovery_sdk::{Node, RegisterNodeRequest, ServiceDiscoveryClient};
use uuid::Uuid;

use super::error::Problem;

pub type ClientState = State<Arc<dyn ServiceDiscoveryClient>>;

pub async fn register(
    State(client): ClientState,
    payload: Result<Json<RegisterNodeRequest>, JsonRejection>,
) -> Result<Json<Node>, Problem> {
    let Json(request) = payload.map_err(|e| Problem::bad_request(e.body_text()))?;
    let node = client.register(request).await?;
    Ok(Json(node))
}

pub async fn list_all(State(client): ClientState) -> Result<Json<Vec<Node>>, Problem> {
    Ok(Json(client.list_nodes(None).await?))
}

pub async fn list_service(
    State(client): ClientState,
    Path(service_name): Path<String>,
) -> Result<Json<Vec<Node>>, Problem> {
    Ok(Json(client.list_nodes(Some(service_name.as_str())).await?))
}

pub async fn deregister(
    State(client): ClientState,
    Path(node_id): Path<String>,
) -> Result<StatusCode, Problem> {
    let id = Uuid::parse_str(&node_id)
        .map_err(|_| Problem::bad_request(format!("'{node_id}' is not a valid node id")))?;
    client.deregister(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
