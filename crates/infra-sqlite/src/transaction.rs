// SQLite Transaction Implementation

use crate::job_store::{fail_job, map_sqlx_error, move_job_to_dlq, schedule_retry_job};
use async_trait::async_trait;
use queuectl_core::domain::{Job, JobId};
use queuectl_core::error::Result;
use queuectl_core::port::{JobStoreTransaction, TimeProvider, Transaction};
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use std::sync::Arc;

/// Failure transitions on one pooled connection.
///
/// Dropped without `commit`, sqlx rolls the transaction back.
pub struct SqliteJobTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobTransaction {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { tx, time_provider }
    }
}

#[async_trait]
impl Transaction for SqliteJobTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl JobStoreTransaction for SqliteJobTransaction {
    async fn fail(&mut self, id: &JobId, error: &str) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        fail_job(&mut *self.tx, id, error, now).await
    }

    async fn schedule_retry(&mut self, id: &JobId, retry_at: i64) -> Result<()> {
        let now = self.time_provider.now_millis();
        schedule_retry_job(&mut *self.tx, id, retry_at, now).await
    }

    async fn move_to_dlq(&mut self, id: &JobId, error: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        move_job_to_dlq(&mut *self.tx, id, error, now).await
    }
}
