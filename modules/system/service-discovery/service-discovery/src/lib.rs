#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Service discovery registry engine.
//!
//! Services register a network endpoint, the registry tracks liveness by
//! polling each node's health endpoint, and every liveness flip is pushed to
//! the other nodes of the same service.
//!
//! ```text
//!   HttpHealthExtractor ──(flipped nodes)──▶ DiscoveryService ──▶ HttpBroadcastGateway
//!            ▲                                     │                    │
//!            │ get_all                             │ add_or_update      │ POST upd_endpoint
//!            └──────────── SeaOrmNodesRepository ◀─┘                    ▼
//!                          (+ eviction timers)                    sibling nodes
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;


pub use config::{HttpClientConfig, ServiceDiscoveryConfig};
pub use domain::error::DomainError;
pub use domain::extractor::{Acknowledgement, HealthUpdate, HealthUpdatesExtractor, SweepBatch};
pub use domain::gateway::NodeUpdatesGateway;
pub use domain::local_client::ServiceDiscoveryLocalClient;
pub use domain::repo::NodesRepository;
pub use domain::service::DiscoveryService;
pub use infra::broadcast::HttpBroadcastGateway;
pub use infra::health::HttpHealthExtractor;
pub use infra::storage::SeaOrmNodesRepository;
