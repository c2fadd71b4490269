use std::sync::Arc;

use service_discovery_sdk::{Node, NodeState, RegisterNodeRequest};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use super::error::DomainError;
use super::extractor::{HealthUpdate, HealthUpdatesExtractor};
use super::gateway::NodeUpdatesGateway;
use super::repo::NodesRepository;

/// Registry orchestrator: turns health transitions into persisted state and
/// sibling notifications, and serves registration and listing.
pub struct DiscoveryService {
    repo: Arc<dyn NodesRepository>,
    extractor: Arc<dyn HealthUpdatesExtractor>,
    gateway: Arc<dyn NodeUpdatesGateway>,
}

impl DiscoveryService {
    #[must_use]
    pub fn new(
        repo: Arc<dyn NodesRepository>,
        extractor: Arc<dyn HealthUpdatesExtractor>,
        gateway: Arc<dyn NodeUpdatesGateway>,
    ) -> Self {
        Self {
            repo,
            extractor,
            gateway,
        }
    }

    /// Consumes extractor output one node at a time until `cancel` fires or
    /// the stream ends.
    ///
    /// # Errors
    /// [`DomainError::Cancelled`] on shutdown, [`DomainError::StreamClosed`]
    /// if the extractor stops on its own, [`DomainError::AlreadyStarted`] if
    /// the stream was already taken.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError> {
        let mut updates = self
            .extractor
            .out()
            .ok_or(DomainError::AlreadyStarted("discovery loop"))?;

        async {
            tracing::info!("discovery loop started");
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        tracing::debug!("discovery loop cancelled");
                        return Err(DomainError::Cancelled);
                    }

                    next = updates.recv() => match next {
                        Some(update) => self.propagate(update).await,
                        None if cancel.is_cancelled() => return Err(DomainError::Cancelled),
                        None => {
                            tracing::warn!("health update stream ended");
                            return Err(DomainError::StreamClosed);
                        }
                    },
                }
            }
        }
        .instrument(tracing::info_span!("discovery_loop"))
        .await
    }

    /// Persists one transition and fans it out to the node's siblings.
    /// Failures are logged and the update is abandoned.
    async fn propagate(&self, update: HealthUpdate) {
        let (node, ack) = update.into_parts();
        let persisted = self.repo.add_or_update(&node).await;
        // The extractor may sweep again once the write has been attempted; a
        // failed write is then reported again.
        ack.release();

        if let Err(e) = persisted {
            tracing::error!(node_id = %node.id, error = %e, "failed to persist node state");
            return;
        }

        let receivers = match self.service_nodes(&node.service_name).await {
            Ok(nodes) => nodes
                .into_iter()
                .filter(|n| n.id != node.id)
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::error!(node_id = %node.id, error = %e, "failed to load sibling nodes");
                return;
            }
        };

        tracing::debug!(
            node_id = %node.id,
            service = %node.service_name,
            receivers = receivers.len(),
            "broadcasting node update"
        );
        if let Err(e) = self.gateway.send(&node, &receivers).await {
            tracing::warn!(node_id = %node.id, error = %e, "failed to queue node update");
        }
    }

    async fn service_nodes(&self, service_name: &str) -> Result<Vec<Node>, DomainError> {
        let mut nodes = self.repo.get_all().await?;
        if !service_name.is_empty() {
            nodes.retain(|n| n.service_name == service_name);
        }
        Ok(nodes)
    }

    /// Registers a new node in state `Up` under a fresh id.
    ///
    /// # Errors
    /// [`DomainError::Validation`] for a malformed request,
    /// [`DomainError::Repository`] when it cannot be stored.
    pub async fn register(&self, request: RegisterNodeRequest) -> Result<Node, DomainError> {
        validate_registration(&request)?;

        let node = Node {
            id: Uuid::new_v4(),
            hostname: request.hostname,
            service_name: request.service_name,
            state: NodeState::Up,
            health_endpoint: request.health_endpoint,
            upd_endpoint: request.upd_endpoint,
            meta: request.meta,
        };
        self.repo.add_or_update(&node).await?;

        tracing::info!(
            node_id = %node.id,
            service = %node.service_name,
            hostname = %node.hostname,
            "node registered"
        );
        Ok(node)
    }

    /// # Errors
    /// [`DomainError::Repository`] when the record cannot be deleted.
    pub async fn deregister(&self, id: Uuid) -> Result<(), DomainError> {
        self.repo.remove(id).await?;
        tracing::info!(node_id = %id, "node deregistered");
        Ok(())
    }

    /// All nodes, or only those of `service_name` when it is non-empty.
    ///
    /// # Errors
    /// [`DomainError::Repository`] when the nodes cannot be read.
    pub async fn list_nodes(&self, service_name: &str) -> Result<Vec<Node>, DomainError> {
        self.service_nodes(service_name).await
    }
}

fn validate_registration(request: &RegisterNodeRequest) -> Result<(), DomainError> {
    if request.hostname.trim().is_empty() {
        return Err(DomainError::Validation("hostname must not be empty".to_owned()));
    }
    if request.service_name.trim().is_empty() {
        return Err(DomainError::Validation(
            "service_name must not be empty".to_owned(),
        ));
    }
    validate_endpoint("health_endpoint", &request.health_endpoint)?;
    validate_endpoint("upd_endpoint", &request.upd_endpoint)
}

fn validate_endpoint(field: &str, value: &str) -> Result<(), DomainError> {
    let url = Url::parse(value)
        .map_err(|e| DomainError::Validation(format!("{field} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(DomainError::Validation(format!(
            "{field} must use http or https, got '{other}'"
        ))),
    }
}
