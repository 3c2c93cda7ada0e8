// Domain Layer - Pure business logic and entities

pub mod config;
pub mod error;
pub mod job;

// Re-exports
pub use config::{BACKOFF_BASE_KEY, JOB_TIMEOUT_KEY, MAX_RETRIES_KEY};
pub use error::DomainError;
pub use job::{Job, JobId, JobSpec, JobState, WorkerId, DEFAULT_MAX_RETRIES};
