// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Every JobStore / QueueService operation returns one of these. The binary
/// maps them to messages and exit codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Job already exists: {0}")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Store-level failures are transient from a worker's point of view
    pub fn is_store(&self) -> bool {
        matches!(self, AppError::Store(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by mapping to AppError::DuplicateId / AppError::Store
