/// Errors surfaced to callers of [`crate::ServiceDiscoveryClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceDiscoveryError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Registry storage unavailable: {0}")]
    Unavailable(String),

    #[error("An internal error occurred")]
    Internal,
}
