use std::sync::Arc;

use async_trait::async_trait;
use service_discovery_sdk::{
    Node, RegisterNodeRequest, ServiceDiscoveryClient, ServiceDiscoveryError,
};
use uuid::Uuid;

use super::service::DiscoveryService;

/// In-process [`ServiceDiscoveryClient`] backed by the registry service.
pub struct ServiceDiscoveryLocalClient {
    service: Arc<DiscoveryService>,
}

impl ServiceDiscoveryLocalClient {
    #[must_use]
    pub fn new(service: Arc<DiscoveryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ServiceDiscoveryClient for ServiceDiscoveryLocalClient {
    async fn register(&self, request: RegisterNodeRequest) -> Result<Node, ServiceDiscoveryError> {
        self.service.register(request).await.map_err(Into::into)
    }

    async fn deregister(&self, node_id: Uuid) -> Result<(), ServiceDiscoveryError> {
        self.service.deregister(node_id).await.map_err(Into::into)
    }

    async fn list_nodes(
        &self,
        service_name: Option<&str>,
    ) -> Result<Vec<Node>, ServiceDiscoveryError> {
        self.service
            .list_nodes(service_name.unwrap_or_default())
            .await
            .map_err(Into::into)
    }
}
