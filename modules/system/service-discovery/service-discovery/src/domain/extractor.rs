use async_trait::async_trait;
use service_discovery_sdk::Node;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::DomainError;

/// Source of liveness transitions.
#[async_trait]
pub trait HealthUpdatesExtractor: Send + Sync {
    /// Runs probe sweeps until `cancel` fires, then closes the output stream
    /// and returns [`DomainError::Cancelled`].
    async fn start(&self, cancel: CancellationToken) -> Result<(), DomainError>;

    /// Receiving end of the stream of nodes whose state flipped, each carrying
    /// its new state. Handed out once; later calls return `None`.
    fn out(&self) -> Option<mpsc::Receiver<HealthUpdate>>;
}

/// A node whose state flipped, carrying its new state.
///
/// The producer does not sweep again until every update of the previous
/// sweep has been acknowledged, either with [`Acknowledgement::release`] or
/// by dropping it.
#[derive(Debug)]
pub struct HealthUpdate {
    pub node: Node,
    ack: Acknowledgement,
}

impl HealthUpdate {
    /// Update outside of any sweep; acknowledging it unblocks nothing.
    #[must_use]
    pub fn detached(node: Node) -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self {
            node,
            ack: Acknowledgement(tx),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (Node, Acknowledgement) {
        (self.node, self.ack)
    }
}

/// Held by the consumer until the update is stored.
#[derive(Debug)]
pub struct Acknowledgement(mpsc::Sender<()>);

impl Acknowledgement {
    pub fn release(self) {
        drop(self.0);
    }
}

/// The outstanding updates of one sweep.
///
/// Every update handed out holds a sender clone that is never used; the
/// batch is settled once all of them are gone.
#[derive(Debug)]
pub struct SweepBatch {
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

impl Default for SweepBatch {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }
}

impl SweepBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn update(&self, node: Node) -> HealthUpdate {
        HealthUpdate {
            node,
            ack: Acknowledgement(self.tx.clone()),
        }
    }

    /// Resolves once every update of this batch has been acknowledged.
    pub async fn settled(self) {
        let Self { tx, mut rx } = self;
        drop(tx);
        while rx.recv().await.is_some() {}
    }
}
