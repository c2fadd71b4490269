#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod api;
pub mod error;
pub mod models;

pub use api::ServiceDiscoveryClient;
pub use error::ServiceDiscoveryError;
pub use models::{Node, NodeState, NodeUpdate, ParseNodeStateError, RegisterNodeRequest};
