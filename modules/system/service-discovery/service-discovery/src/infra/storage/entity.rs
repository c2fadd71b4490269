use anyhow::Context;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use service_discovery_sdk::{Node, NodeState};

/// One row per node. `payload` holds the full serialized record; `state` and
/// `down_since` are kept alongside so eviction can work without decoding it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub state: String,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// Unix millis of the latest `Down` write, `None` while `Up`.
    pub down_since: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_node(self) -> anyhow::Result<Node> {
        let mut node: Node = serde_json::from_str(&self.payload)
            .with_context(|| format!("corrupt payload for node {}", self.id))?;
        node.state = self.state.parse::<NodeState>()?;
        Ok(node)
    }
}

pub fn active_model(node: &Node, now_millis: i64) -> anyhow::Result<ActiveModel> {
    let down_since = match node.state {
        NodeState::Down => Some(now_millis),
        NodeState::Up => None,
    };
    Ok(ActiveModel {
        id: Set(node.id.to_string()),
        state: Set(node.state.as_str().to_owned()),
        payload: Set(serde_json::to_string(node)?),
        down_since: Set(down_since),
    })
}
