#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use service_discovery::{HttpClientConfig, SeaOrmNodesRepository, ServiceDiscoveryConfig};
use service_discovery_sdk::{Node, NodeState, RegisterNodeRequest};
use uuid::Uuid;

pub const API_KEY: &str = "test-key";

pub fn config(interval: Duration, grace: Duration) -> ServiceDiscoveryConfig {
    ServiceDiscoveryConfig {
        api_key: API_KEY.to_owned(),
        eviction_grace: grace,
        healthcheck_interval: interval,
        gateway_workers: 2,
        gateway_queue_size: 8,
        extractor_buffer: 16,
        probe_concurrency: 4,
        http: HttpClientConfig {
            request_timeout: Duration::from_secs(2),
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
        },
    }
}

pub async fn memory_repo(grace: Duration) -> Arc<SeaOrmNodesRepository> {
    Arc::new(
        SeaOrmNodesRepository::connect("sqlite::memory:", 1, grace)
            .await
            .expect("in-memory sqlite"),
    )
}

/// Node whose endpoints live under `/{host}/` on `server`.
pub fn node_on(server: &MockServer, service: &str, host: &str) -> Node {
    Node {
        id: Uuid::new_v4(),
        hostname: host.to_owned(),
        service_name: service.to_owned(),
        state: NodeState::Up,
        health_endpoint: server.url(format!("/{host}/health")),
        upd_endpoint: server.url(format!("/{host}/updates")),
        meta: HashMap::new(),
    }
}

pub fn register_on(server: &MockServer, service: &str, host: &str) -> RegisterNodeRequest {
    RegisterNodeRequest {
        hostname: host.to_owned(),
        service_name: service.to_owned(),
        health_endpoint: server.url(format!("/{host}/health")),
        upd_endpoint: server.url(format!("/{host}/updates")),
        meta: HashMap::from([("zone".to_owned(), "eu-1".to_owned())]),
    }
}

/// Polls `check` every 10ms until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
