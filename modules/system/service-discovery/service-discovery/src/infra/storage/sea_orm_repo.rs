use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::OnConflict,
};
use sea_orm_migration::MigratorTrait;
use service_discovery_sdk::{Node, NodeState};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::repo::NodesRepository;

use super::entity::{self, Entity as NodesEntity};
use super::eviction::EvictionTimers;
use super::migrations::Migrator;

/// Node repository over a SQL database, with in-memory eviction timers for
/// nodes persisted as `Down`.
pub struct SeaOrmNodesRepository {
    db: DatabaseConnection,
    eviction_grace: Duration,
    timers: EvictionTimers,
}

impl SeaOrmNodesRepository {
    #[must_use]
    pub fn new(db: DatabaseConnection, eviction_grace: Duration) -> Self {
        Self {
            db,
            eviction_grace,
            timers: EvictionTimers::new(),
        }
    }

    /// Opens the database at `dsn` and brings its schema up to date.
    ///
    /// # Errors
    /// Fails when the database cannot be reached or migrated.
    pub async fn connect(
        dsn: &str,
        max_connections: u32,
        eviction_grace: Duration,
    ) -> anyhow::Result<Self> {
        let mut opts = ConnectOptions::new(dsn.to_owned());
        opts.max_connections(max_connections).sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .with_context(|| format!("failed to connect to {dsn}"))?;

        let repo = Self::new(db, eviction_grace);
        repo.migrate().await?;
        Ok(repo)
    }

    /// # Errors
    /// Fails when a migration cannot be applied.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        Migrator::up(&self.db, None)
            .await
            .context("failed to apply nodes migrations")?;
        Ok(())
    }

    #[must_use]
    pub fn timers(&self) -> &EvictionTimers {
        &self.timers
    }

    /// Re-arms timers for nodes that were already `Down` when the process
    /// started, counting from the persisted `down_since`. Nodes past their
    /// deadline are armed to fire immediately.
    ///
    /// # Errors
    /// Fails when the `Down` nodes cannot be read.
    pub async fn restore_evictions(&self) -> anyhow::Result<usize> {
        let down = NodesEntity::find()
            .filter(entity::Column::State.eq(NodeState::Down.as_str()))
            .all(&self.db)
            .await?;

        let now = now_millis();
        let mut restored = 0;
        for model in down {
            let Ok(id) = Uuid::parse_str(&model.id) else {
                tracing::warn!(node_id = %model.id, "skipping eviction restore for malformed id");
                continue;
            };
            let remaining = model.down_since.map_or(self.eviction_grace, |since| {
                let elapsed = u64::try_from(now.saturating_sub(since)).unwrap_or(0);
                self.eviction_grace
                    .saturating_sub(Duration::from_millis(elapsed))
            });
            self.timers.arm(id, remaining);
            restored += 1;
        }

        if restored > 0 {
            tracing::info!(count = restored, "restored pending node evictions");
        }
        Ok(restored)
    }

    /// Drives the eviction timers until `cancel` fires. Every expired node
    /// that is still `Down` is deleted.
    ///
    /// # Errors
    /// Returns [`DomainError::Cancelled`] on shutdown.
    pub async fn run_evictions(&self, cancel: CancellationToken) -> Result<(), DomainError> {
        async {
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        tracing::debug!(pending = self.timers.len(), "eviction driver cancelled");
                        self.timers.clear();
                        return Err(DomainError::Cancelled);
                    }

                    id = self.timers.next_expired() => {
                        self.evict(id).await;
                    }
                }
            }
        }
        .instrument(tracing::info_span!("node_evictions"))
        .await
    }

    async fn evict(&self, id: Uuid) {
        // A fresh Down write re-armed the node after this timer fired.
        if self.timers.is_armed(id) {
            return;
        }

        let result = NodesEntity::delete_many()
            .filter(entity::Column::Id.eq(id.to_string()))
            .filter(entity::Column::State.eq(NodeState::Down.as_str()))
            .exec(&self.db)
            .await;

        match result {
            Ok(res) if res.rows_affected > 0 => {
                tracing::info!(node_id = %id, "evicted node that stayed down past the grace period");
            }
            Ok(_) => {
                tracing::debug!(node_id = %id, "node gone or back up, nothing to evict");
            }
            Err(e) => {
                tracing::warn!(node_id = %id, error = %e, "eviction failed, retrying after grace period");
                if !self.timers.is_armed(id) {
                    self.timers.arm(id, self.eviction_grace);
                }
            }
        }
    }
}

#[async_trait]
impl NodesRepository for SeaOrmNodesRepository {
    async fn get_all(&self) -> anyhow::Result<Vec<Node>> {
        NodesEntity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(entity::Model::into_node)
            .collect()
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Node>> {
        NodesEntity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(entity::Model::into_node)
            .transpose()
    }

    async fn add_or_update(&self, node: &Node) -> anyhow::Result<()> {
        let active_model = entity::active_model(node, now_millis())?;

        NodesEntity::insert(active_model)
            .on_conflict(
                OnConflict::column(entity::Column::Id)
                    .update_columns([
                        entity::Column::State,
                        entity::Column::Payload,
                        entity::Column::DownSince,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        match node.state {
            NodeState::Down => {
                self.timers.arm(node.id, self.eviction_grace);
                tracing::debug!(node_id = %node.id, grace = ?self.eviction_grace, "eviction armed");
            }
            NodeState::Up => {
                if self.timers.disarm(node.id) {
                    tracing::debug!(node_id = %node.id, "eviction cancelled");
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> anyhow::Result<()> {
        NodesEntity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        self.timers.disarm(id);
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
