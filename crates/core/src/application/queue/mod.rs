// Queue Service - Use cases exposed to the CLI

pub mod enqueue;
#[cfg(test)]
mod enqueue_test;

use crate::domain::{Job, JobId, JobSpec, JobState};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Aggregated queue view
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Count per state; every state is present
    pub counts: BTreeMap<JobState, i64>,
    /// Jobs currently held by a worker
    pub processing: Vec<Job>,
}

impl QueueStatus {
    pub fn count(&self, state: JobState) -> i64 {
        self.counts.get(&state).copied().unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }
}

/// Queue Service
pub struct QueueService {
    store: Arc<dyn JobStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueService {
    pub fn new(
        store: Arc<dyn JobStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            id_provider,
            time_provider,
        }
    }

    /// Enqueue a new job
    pub async fn enqueue(&self, spec: JobSpec) -> Result<Job> {
        enqueue::execute(
            self.store.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            spec,
        )
        .await
    }

    /// Enqueue from a JSON document such as `{"id":"a","command":"true"}`
    pub async fn enqueue_json(&self, document: &str) -> Result<Job> {
        let spec: JobSpec = serde_json::from_str(document)
            .map_err(|e| AppError::InvalidSpec(format!("invalid JSON: {}", e)))?;
        self.enqueue(spec).await
    }

    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.store.list(state).await
    }

    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", id)))
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        let counts = self.store.count_by_state().await?;
        let processing = self.store.list(Some(JobState::Processing)).await?;
        Ok(QueueStatus { counts, processing })
    }

    pub async fn dlq_list(&self) -> Result<Vec<Job>> {
        self.store.list(Some(JobState::Dead)).await
    }

    /// Move a dead job back to pending
    ///
    /// # Errors
    /// - `AppError::NotFound` if the job does not exist or is not dead
    pub async fn dlq_retry(&self, id: &JobId) -> Result<()> {
        if self.store.retry_from_dlq(id).await? {
            info!(job_id = %id, "Job moved from DLQ back to pending");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("no dead job with id {}", id)))
        }
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.store.get_config(key).await
    }

    pub async fn config_set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.store.set_config(key, &value).await?;
        info!(key = %key, value = %value, "Config updated");
        Ok(())
    }
}
