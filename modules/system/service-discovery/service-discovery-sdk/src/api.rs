use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ServiceDiscoveryError;
use crate::models::{Node, RegisterNodeRequest};

/// Public API of the service discovery registry.
///
/// The registry ships an in-process implementation; the REST layer talks to
/// the engine exclusively through this trait.
#[async_trait]
pub trait ServiceDiscoveryClient: Send + Sync {
    /// Register a new node. The registry assigns the id and marks it `Up`.
    async fn register(&self, request: RegisterNodeRequest) -> Result<Node, ServiceDiscoveryError>;

    /// Remove a node. Removing an unknown id succeeds.
    async fn deregister(&self, node_id: Uuid) -> Result<(), ServiceDiscoveryError>;

    /// List nodes, optionally restricted to one service.
    async fn list_nodes(
        &self,
        service_name: Option<&str>,
    ) -> Result<Vec<Node>, ServiceDiscoveryError>;
}
