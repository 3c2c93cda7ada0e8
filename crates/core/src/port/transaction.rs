// Transaction port for atomic operations

use crate::domain::{Job, JobId};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// JobStore failure transitions within a transaction
///
/// Used by workers so that `fail` and the follow-up `schedule_retry` /
/// `move_to_dlq` land together. Other workers never see a failed row
/// without its backoff.
#[async_trait]
pub trait JobStoreTransaction: Transaction {
    /// Record a failed attempt (within transaction); returns the updated row
    async fn fail(&mut self, id: &JobId, error: &str) -> Result<Option<Job>>;

    /// Set next_retry_at (within transaction)
    async fn schedule_retry(&mut self, id: &JobId, retry_at: i64) -> Result<()>;

    /// Move to DLQ (within transaction)
    async fn move_to_dlq(&mut self, id: &JobId, error: &str) -> Result<()>;
}
