use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use service_discovery_sdk::{Node, NodeState};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ServiceDiscoveryConfig;
use crate::domain::error::DomainError;
use crate::domain::extractor::{HealthUpdate, HealthUpdatesExtractor, SweepBatch};
use crate::domain::repo::NodesRepository;
use crate::infra::http::{RetryPolicy, build_client};

/// Polls every node's health endpoint and emits the nodes whose state
/// flipped relative to what the repository holds.
pub struct HttpHealthExtractor {
    repo: Arc<dyn NodesRepository>,
    client: reqwest::Client,
    retry: RetryPolicy,
    interval: Duration,
    concurrency: usize,
    tx: Mutex<Option<mpsc::Sender<HealthUpdate>>>,
    rx: Mutex<Option<mpsc::Receiver<HealthUpdate>>>,
}

impl HttpHealthExtractor {
    /// # Errors
    /// [`DomainError::InvalidConfig`] for a zero interval, buffer or
    /// concurrency, or an unusable API key.
    pub fn new(
        repo: Arc<dyn NodesRepository>,
        config: &ServiceDiscoveryConfig,
    ) -> Result<Self, DomainError> {
        let client = build_client(&config.api_key, &config.http)?;
        Self::with_client(repo, client, config)
    }

    /// Same as [`Self::new`] with a caller-supplied client.
    ///
    /// # Errors
    /// [`DomainError::InvalidConfig`] for zero sizes or interval.
    pub fn with_client(
        repo: Arc<dyn NodesRepository>,
        client: reqwest::Client,
        config: &ServiceDiscoveryConfig,
    ) -> Result<Self, DomainError> {
        if config.healthcheck_interval.is_zero() {
            return Err(DomainError::InvalidConfig(
                "healthcheck_interval must be greater than zero".to_owned(),
            ));
        }
        if config.extractor_buffer == 0 || config.probe_concurrency == 0 {
            return Err(DomainError::InvalidConfig(
                "extractor_buffer and probe_concurrency must be greater than zero".to_owned(),
            ));
        }

        let (tx, rx) = mpsc::channel(config.extractor_buffer);
        Ok(Self {
            repo,
            client,
            retry: RetryPolicy::from_config(&config.http),
            interval: config.healthcheck_interval,
            concurrency: config.probe_concurrency,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        })
    }

    /// Probes every persisted node once and returns the ones whose
    /// classification differs from their stored state, carrying the new state.
    ///
    /// # Errors
    /// Fails only when the node snapshot cannot be read.
    pub async fn sweep(&self) -> Result<Vec<Node>, DomainError> {
        let nodes = self.repo.get_all().await?;
        tracing::trace!(nodes = nodes.len(), "probing nodes");

        let changed: Vec<Node> = stream::iter(nodes)
            .map(|node| async move {
                let observed = NodeState::from_healthy(self.probe(&node).await);
                (observed != node.state).then(|| node.with_state(observed))
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|flipped| async move { flipped })
            .collect()
            .await;
        Ok(changed)
    }

    async fn probe(&self, node: &Node) -> bool {
        let result = self
            .retry
            .execute(|| self.client.get(&node.health_endpoint).send())
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    node_id = %node.id,
                    endpoint = %node.health_endpoint,
                    status = %response.status(),
                    "health check returned failure status"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    node_id = %node.id,
                    endpoint = %node.health_endpoint,
                    error = %e,
                    "health check failed"
                );
                false
            }
        }
    }

    async fn run(
        &self,
        tx: mpsc::Sender<HealthUpdate>,
        cancel: CancellationToken,
    ) -> Result<(), DomainError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!("health extractor cancelled");
                    return Err(DomainError::Cancelled);
                }

                _ = ticker.tick() => {}
            }

            let changed = tokio::select! {
                biased;

                () = cancel.cancelled() => return Err(DomainError::Cancelled),

                result = self.sweep() => match result {
                    Ok(changed) => changed,
                    Err(e) => {
                        tracing::warn!(error = %e, "health sweep skipped");
                        continue;
                    }
                },
            };

            let batch = SweepBatch::new();
            for node in changed {
                tracing::info!(
                    node_id = %node.id,
                    service = %node.service_name,
                    state = %node.state,
                    "node state changed"
                );
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => return Err(DomainError::Cancelled),

                    sent = tx.send(batch.update(node)) => {
                        if sent.is_err() {
                            tracing::warn!("health update consumer is gone");
                            return Err(DomainError::StreamClosed);
                        }
                    }
                }
            }

            // The next sweep compares against stored state, so it waits until
            // the consumer has stored this one. Ticks meanwhile are skipped.
            tokio::select! {
                biased;

                () = cancel.cancelled() => return Err(DomainError::Cancelled),

                () = batch.settled() => {}
            }
        }
    }
}

#[async_trait]
impl HealthUpdatesExtractor for HttpHealthExtractor {
    async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError> {
        let tx = self
            .tx
            .lock()
            .take()
            .ok_or(DomainError::AlreadyStarted("health extractor"))?;

        tracing::info!(interval = ?self.interval, "health extractor started");
        // `tx` is dropped on return, closing the output stream.
        self.run(tx, cancel)
            .instrument(tracing::info_span!("health_extractor"))
            .await
    }

    fn out(&self) -> Option<mpsc::Receiver<HealthUpdate>> {
        self.rx.lock().take()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use httpmock::prelude::*;
    use tracing_test::traced_test;
    use uuid::Uuid;

    use crate::infra::storage::SeaOrmNodesRepository;

    #[tokio::test]
    #[traced_test]
    async fn failed_probe_is_logged_as_warning() {
        let server = MockServer::start();
        let _unhealthy = server.mock(|when, then| {
            when.method(GET).path("/a/health");
            then.status(500);
        });

        let repo = Arc::new(
            SeaOrmNodesRepository::connect("sqlite::memory:", 1, Duration::from_secs(60))
                .await
                .unwrap(),
        );
        let node = Node {
            id: Uuid::new_v4(),
            hostname: "a".to_owned(),
            service_name: "svc".to_owned(),
            state: NodeState::Up,
            health_endpoint: server.url("/a/health"),
            upd_endpoint: server.url("/a/updates"),
            meta: HashMap::new(),
        };
        repo.add_or_update(&node).await.unwrap();

        let config = ServiceDiscoveryConfig {
            api_key: "secret".to_owned(),
            ..ServiceDiscoveryConfig::default()
        };
        let extractor = HttpHealthExtractor::new(repo, &config).unwrap();
        assert_eq!(extractor.sweep().await.unwrap().len(), 1);

        logs_assert(|lines: &[&str]| {
            if lines
                .iter()
                .any(|line| line.contains("WARN") && line.contains("health check returned failure status"))
            {
                Ok(())
            } else {
                Err("failed probe was not logged at warn".to_owned())
            }
        });
    }
}
