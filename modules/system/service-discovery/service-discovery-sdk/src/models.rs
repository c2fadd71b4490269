use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Liveness of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Up,
    Down,
}

impl NodeState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
        }
    }

    /// Classification of a probe outcome.
    #[must_use]
    pub const fn from_healthy(healthy: bool) -> Self {
        if healthy { Self::Up } else { Self::Down }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node state: {0}")]
pub struct ParseNodeStateError(pub String);

impl FromStr for NodeState {
    type Err = ParseNodeStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Up" => Ok(Self::Up),
            "Down" => Ok(Self::Down),
            other => Err(ParseNodeStateError(other.to_owned())),
        }
    }
}

/// One registered instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub hostname: String,
    pub service_name: String,
    pub state: NodeState,
    pub health_endpoint: String,
    pub upd_endpoint: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

impl Node {
    /// Copy of this node carrying `state`.
    #[must_use]
    pub fn with_state(&self, state: NodeState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

/// Registration payload submitted by a service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub hostname: String,
    pub service_name: String,
    pub health_endpoint: String,
    pub upd_endpoint: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Body pushed to sibling nodes' update endpoints when a node flips state.
///
/// Carries only the public identity of the node; probe and callback
/// endpoints stay private to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub id: Uuid,
    pub hostname: String,
    pub service_name: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

impl From<&Node> for NodeUpdate {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            hostname: node.hostname.clone(),
            service_name: node.service_name.clone(),
            state: node.state.to_string(),
            meta: node.meta.clone(),
        }
    }
}
