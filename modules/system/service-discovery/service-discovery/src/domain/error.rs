use service_discovery_sdk::ServiceDiscoveryError;

/// Domain-level errors for the discovery engine
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Update gateway is closed")]
    GatewayClosed,

    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("Health update stream closed")]
    StreamClosed,
}

impl DomainError {
    /// Shutdown is reported as [`DomainError::Cancelled`]; callers use this to
    /// tell a clean stop from a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<anyhow::Error> for DomainError {
    fn from(e: anyhow::Error) -> Self {
        Self::Repository(format!("{e:#}"))
    }
}

impl From<DomainError> for ServiceDiscoveryError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::Repository(msg) => Self::Unavailable(msg),
            DomainError::InvalidConfig(_)
            | DomainError::Cancelled
            | DomainError::GatewayClosed
            | DomainError::AlreadyStarted(_)
            | DomainError::StreamClosed => Self::Internal,
        }
    }
}
