use async_trait::async_trait;
use service_discovery_sdk::Node;
use tokio_util::sync::CancellationToken;

use super::error::DomainError;

/// Fan-out of one node's new state to its sibling nodes.
#[async_trait]
pub trait NodeUpdatesGateway: Send + Sync {
    /// Runs the delivery workers until `cancel` fires, then closes the queue,
    /// waits for the workers and returns [`DomainError::Cancelled`].
    async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError>;

    /// Queues one delivery of `update` per receiver, skipping the receiver
    /// whose id equals `update.id`.
    ///
    /// # Errors
    /// [`DomainError::GatewayClosed`] once the gateway has shut down.
    async fn send(&self, update: &Node, receivers: &[Node]) -> Result<(), DomainError>;
}
