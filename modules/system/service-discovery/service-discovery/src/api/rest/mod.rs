//! Public HTTP surface of the registry.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::router;
