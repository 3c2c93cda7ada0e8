// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown job state: {0}")]
    UnknownState(String),

    #[error("Invalid {0}: {1}")]
    InvalidCount(&'static str, i64),
}
