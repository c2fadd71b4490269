use async_trait::async_trait;
use service_discovery_sdk::Node;
use uuid::Uuid;

/// Durable store of node records.
///
/// Implementations own the eviction timers of nodes persisted as `Down`:
/// writing `Down` arms (or re-arms) the timer, writing `Up` or removing the
/// node cancels it.
#[async_trait]
pub trait NodesRepository: Send + Sync {
    /// Snapshot of every persisted node, in no particular order.
    async fn get_all(&self) -> anyhow::Result<Vec<Node>>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Node>>;

    /// Upserts by `node.id`.
    async fn add_or_update(&self, node: &Node) -> anyhow::Result<()>;

    /// Deletes the record; removing an unknown id is not an error.
    async fn remove(&self, id: Uuid) -> anyhow::Result<()>;
}
