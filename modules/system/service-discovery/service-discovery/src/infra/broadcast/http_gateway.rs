use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use service_discovery_sdk::{Node, NodeUpdate};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServiceDiscoveryConfig;
use crate::domain::error::DomainError;
use crate::domain::gateway::NodeUpdatesGateway;
use crate::infra::http::{RetryPolicy, build_client};

/// One delivery: push `update` to a single receiver's update endpoint.
#[derive(Debug, Clone)]
struct Delivery {
    receiver_id: Uuid,
    endpoint: String,
    update: Arc<NodeUpdate>,
}

type TaskQueue = Arc<AsyncMutex<mpsc::Receiver<Delivery>>>;

/// Pushes node updates to sibling nodes with a fixed pool of workers.
///
/// Delivery is best effort: a failed push is logged and dropped.
pub struct HttpBroadcastGateway {
    client: reqwest::Client,
    retry: RetryPolicy,
    workers: usize,
    /// `None` once the gateway has shut down.
    sender: RwLock<Option<mpsc::Sender<Delivery>>>,
    receiver: Mutex<Option<mpsc::Receiver<Delivery>>>,
}

impl HttpBroadcastGateway {
    /// # Errors
    /// [`DomainError::InvalidConfig`] for a zero pool or queue size, or an
    /// unusable API key.
    pub fn new(config: &ServiceDiscoveryConfig) -> Result<Self, DomainError> {
        let client = build_client(&config.api_key, &config.http)?;
        Self::with_client(client, config)
    }

    /// Same as [`Self::new`] with a caller-supplied client.
    ///
    /// # Errors
    /// [`DomainError::InvalidConfig`] for a zero pool or queue size.
    pub fn with_client(
        client: reqwest::Client,
        config: &ServiceDiscoveryConfig,
    ) -> Result<Self, DomainError> {
        if config.gateway_workers == 0 || config.gateway_queue_size == 0 {
            return Err(DomainError::InvalidConfig(
                "gateway_workers and gateway_queue_size must be greater than zero".to_owned(),
            ));
        }

        let (tx, rx) = mpsc::channel(config.gateway_queue_size);
        Ok(Self {
            client,
            retry: RetryPolicy::from_config(&config.http),
            workers: config.gateway_workers,
            sender: RwLock::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    fn close(&self) {
        if self.sender.write().take().is_some() {
            tracing::debug!("update queue closed");
        }
    }

    fn spawn_workers(&self, tracker: &TaskTracker, queue: &TaskQueue, cancel: &CancellationToken) {
        for worker in 0..self.workers {
            let queue = Arc::clone(queue);
            let cancel = cancel.clone();
            let client = self.client.clone();
            let retry = self.retry;
            tracker.spawn(
                async move {
                    loop {
                        // Lock only while waiting for the next task so other
                        // workers deliver in parallel.
                        let task = queue.lock().await.recv().await;
                        let Some(task) = task else { break };

                        if cancel.is_cancelled() {
                            tracing::debug!(receiver = %task.receiver_id, "dropping undelivered update on shutdown");
                            continue;
                        }
                        tokio::select! {
                            biased;

                            () = cancel.cancelled() => {
                                tracing::debug!(receiver = %task.receiver_id, "update delivery interrupted by shutdown");
                            }

                            () = deliver(&client, retry, &task) => {}
                        }
                    }
                    tracing::trace!(worker, "gateway worker stopped");
                }
                .in_current_span(),
            );
        }
    }
}

async fn deliver(client: &reqwest::Client, retry: RetryPolicy, task: &Delivery) {
    let result = retry
        .execute(|| client.post(&task.endpoint).json(task.update.as_ref()).send())
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(
                node_id = %task.update.id,
                receiver = %task.receiver_id,
                "update delivered"
            );
        }
        Ok(response) => {
            tracing::warn!(
                node_id = %task.update.id,
                receiver = %task.receiver_id,
                endpoint = %task.endpoint,
                status = %response.status(),
                "update rejected by receiver"
            );
        }
        Err(e) => {
            tracing::warn!(
                node_id = %task.update.id,
                receiver = %task.receiver_id,
                endpoint = %task.endpoint,
                error = %e,
                "update delivery failed"
            );
        }
    }
}

#[async_trait]
impl NodeUpdatesGateway for HttpBroadcastGateway {
    async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(DomainError::AlreadyStarted("updates gateway"))?;

        async {
            let queue: TaskQueue = Arc::new(AsyncMutex::new(receiver));
            let tracker = TaskTracker::new();
            self.spawn_workers(&tracker, &queue, &cancel);
            tracker.close();
            tracing::info!(workers = self.workers, "updates gateway started");

            cancel.cancelled().await;

            // Workers exit once the queue is closed and drained.
            self.close();
            tracker.wait().await;
            tracing::info!("updates gateway stopped");
            Err(DomainError::Cancelled)
        }
        .instrument(tracing::info_span!("updates_gateway"))
        .await
    }

    async fn send(&self, update: &Node, receivers: &[Node]) -> Result<(), DomainError> {
        let tx = self
            .sender
            .read()
            .clone()
            .ok_or(DomainError::GatewayClosed)?;

        let payload = Arc::new(NodeUpdate::from(update));
        for receiver in receivers.iter().filter(|r| r.id != update.id) {
            let task = Delivery {
                receiver_id: receiver.id,
                endpoint: receiver.upd_endpoint.clone(),
                update: Arc::clone(&payload),
            };
            tx.send(task)
                .await
                .map_err(|_| DomainError::GatewayClosed)?;
        }
        Ok(())
    }
}
