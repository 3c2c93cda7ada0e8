// Job Store Port (Interface)

use crate::domain::{Job, JobId, JobState};
use crate::error::Result;
use crate::port::JobStoreTransaction;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Durable home for jobs and config entries.
///
/// The store is the only authority for state transitions. Every operation is
/// a single-row statement except `acquire`, which is a single atomic
/// read-modify-write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job
    ///
    /// # Errors
    /// - `AppError::DuplicateId` if the id already exists (nothing is written)
    async fn enqueue(&self, job: &Job) -> Result<()>;

    /// Atomically claim the oldest eligible job for `worker_id`.
    ///
    /// Eligible: `pending`, or `failed` with `attempts < max_retries` and
    /// `next_retry_at` unset or due. The claimed row is `processing` with
    /// `worker_id` set and `next_retry_at` cleared. Two concurrent callers
    /// never receive the same job. `None` means nothing is eligible.
    async fn acquire(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Mark a job completed. No-op if the job is missing.
    async fn complete(&self, id: &JobId) -> Result<()>;

    /// Record a failed attempt (`attempts += 1`, `state = failed`)
    async fn fail(&self, id: &JobId, error: &str) -> Result<Option<Job>>;

    /// Set `next_retry_at` on a failed job; state is unchanged
    async fn schedule_retry(&self, id: &JobId, retry_at: i64) -> Result<()>;

    /// Move a job to the dead letter queue
    async fn move_to_dlq(&self, id: &JobId, error: &str) -> Result<()>;

    /// Resurrect a dead job to pending with a fresh attempt budget.
    ///
    /// Returns false (and writes nothing) if the job is missing or not dead.
    async fn retry_from_dlq(&self, id: &JobId) -> Result<bool>;

    /// Snapshot of jobs, optionally filtered by state
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>>;

    /// Find job by ID
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Count jobs by state (states with no jobs are reported as 0)
    async fn count_by_state(&self) -> Result<BTreeMap<JobState, i64>>;

    /// Put `processing` jobs last touched before `cutoff_millis` back to pending
    async fn requeue_stale(&self, cutoff_millis: i64) -> Result<u64>;

    /// Read a config value
    async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Upsert a config value
    async fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Begin a transaction for multi-step failure handling
    async fn begin_transaction(&self) -> Result<Box<dyn JobStoreTransaction>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::{TimeProvider, Transaction};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::{Mutex, OwnedMutexGuard};

    #[derive(Debug, Clone, Default)]
    struct State {
        jobs: Vec<Job>, // insertion order doubles as FIFO tie-break
        config: BTreeMap<String, serde_json::Value>,
    }

    impl State {
        fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
            self.jobs.iter_mut().find(|j| j.id == id)
        }

        fn fail(&mut self, id: &str, error: &str, now: i64) -> Option<Job> {
            let job = self
                .job_mut(id)
                .filter(|j| j.state == JobState::Processing)?;
            job.state = JobState::Failed;
            job.attempts += 1;
            job.last_error = Some(error.to_string());
            job.worker_id = None;
            job.updated_at = now;
            Some(job.clone())
        }

        fn schedule_retry(&mut self, id: &str, retry_at: i64, now: i64) {
            if let Some(job) = self.job_mut(id).filter(|j| j.state == JobState::Failed) {
                job.next_retry_at = Some(retry_at);
                job.updated_at = now;
            }
        }

        fn move_to_dlq(&mut self, id: &str, error: &str, now: i64) {
            if let Some(job) = self.job_mut(id).filter(|j| {
                matches!(
                    j.state,
                    JobState::Pending | JobState::Processing | JobState::Failed
                )
            }) {
                job.state = JobState::Dead;
                job.last_error = Some(error.to_string());
                job.worker_id = None;
                job.next_retry_at = None;
                job.updated_at = now;
            }
        }
    }

    /// In-memory JobStore with the same transition rules as the SQLite adapter.
    ///
    /// A transaction holds the store lock until commit/rollback, like the
    /// SQLite write lock.
    pub struct InMemoryJobStore {
        state: Arc<Mutex<State>>,
        time_provider: Arc<dyn TimeProvider>,
        fail_next_acquire: AtomicBool,
        failing_completes: AtomicU32,
        failing_transactions: AtomicU32,
    }

    impl InMemoryJobStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                state: Arc::new(Mutex::new(State::default())),
                time_provider,
                fail_next_acquire: AtomicBool::new(false),
                failing_completes: AtomicU32::new(0),
                failing_transactions: AtomicU32::new(0),
            }
        }

        /// Make the next `acquire` return a store error
        pub fn fail_next_acquire(&self) {
            self.fail_next_acquire.store(true, Ordering::SeqCst);
        }

        /// Make the next `n` calls to `complete` return a store error
        pub fn fail_next_completes(&self, n: u32) {
            self.failing_completes.store(n, Ordering::SeqCst);
        }

        /// Make the next `n` calls to `begin_transaction` return a store error
        pub fn fail_next_transactions(&self, n: u32) {
            self.failing_transactions.store(n, Ordering::SeqCst);
        }

        fn take_injected(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        /// Overwrite a stored job as-is (test setup)
        pub async fn put(&self, job: Job) {
            let mut state = self.state.lock().await;
            match state.job_mut(&job.id) {
                Some(existing) => *existing = job,
                None => state.jobs.push(job),
            }
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn enqueue(&self, job: &Job) -> Result<()> {
            let mut state = self.state.lock().await;
            if state.jobs.iter().any(|j| j.id == job.id) {
                return Err(AppError::DuplicateId(job.id.clone()));
            }
            state.jobs.push(job.clone());
            Ok(())
        }

        async fn acquire(&self, worker_id: &str) -> Result<Option<Job>> {
            if self.fail_next_acquire.swap(false, Ordering::SeqCst) {
                return Err(AppError::Store("injected acquire failure".to_string()));
            }
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().await;
            let candidate = state
                .jobs
                .iter_mut()
                .filter(|j| j.is_eligible(now))
                .min_by_key(|j| j.created_at);
            Ok(candidate.map(|job| {
                job.state = JobState::Processing;
                job.worker_id = Some(worker_id.to_string());
                job.next_retry_at = None;
                job.updated_at = now;
                job.clone()
            }))
        }

        async fn complete(&self, id: &JobId) -> Result<()> {
            if Self::take_injected(&self.failing_completes) {
                return Err(AppError::Store("injected complete failure".to_string()));
            }
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().await;
            if let Some(job) = state
                .job_mut(id)
                .filter(|j| j.state == JobState::Processing)
            {
                job.state = JobState::Completed;
                job.worker_id = None;
                job.updated_at = now;
            }
            Ok(())
        }

        async fn fail(&self, id: &JobId, error: &str) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            Ok(self.state.lock().await.fail(id, error, now))
        }

        async fn schedule_retry(&self, id: &JobId, retry_at: i64) -> Result<()> {
            let now = self.time_provider.now_millis();
            self.state.lock().await.schedule_retry(id, retry_at, now);
            Ok(())
        }

        async fn move_to_dlq(&self, id: &JobId, error: &str) -> Result<()> {
            let now = self.time_provider.now_millis();
            self.state.lock().await.move_to_dlq(id, error, now);
            Ok(())
        }

        async fn retry_from_dlq(&self, id: &JobId) -> Result<bool> {
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().await;
            match state.job_mut(id).filter(|j| j.state == JobState::Dead) {
                Some(job) => {
                    job.state = JobState::Pending;
                    job.attempts = 0;
                    job.worker_id = None;
                    job.last_error = None;
                    job.next_retry_at = None;
                    job.updated_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn list(&self, state_filter: Option<JobState>) -> Result<Vec<Job>> {
            let state = self.state.lock().await;
            Ok(state
                .jobs
                .iter()
                .filter(|j| state_filter.map_or(true, |s| j.state == s))
                .cloned()
                .collect())
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>> {
            let state = self.state.lock().await;
            Ok(state.jobs.iter().find(|j| &j.id == id).cloned())
        }

        async fn count_by_state(&self) -> Result<BTreeMap<JobState, i64>> {
            let state = self.state.lock().await;
            let mut counts: BTreeMap<JobState, i64> =
                JobState::ALL.iter().map(|s| (*s, 0)).collect();
            for job in &state.jobs {
                *counts.entry(job.state).or_insert(0) += 1;
            }
            Ok(counts)
        }

        async fn requeue_stale(&self, cutoff_millis: i64) -> Result<u64> {
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().await;
            let mut requeued = 0;
            for job in state
                .jobs
                .iter_mut()
                .filter(|j| j.state == JobState::Processing && j.updated_at < cutoff_millis)
            {
                job.state = JobState::Pending;
                job.worker_id = None;
                job.updated_at = now;
                requeued += 1;
            }
            Ok(requeued)
        }

        async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>> {
            Ok(self.state.lock().await.config.get(key).cloned())
        }

        async fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
            self.state
                .lock()
                .await
                .config
                .insert(key.to_string(), value.clone());
            Ok(())
        }

        async fn begin_transaction(&self) -> Result<Box<dyn JobStoreTransaction>> {
            if Self::take_injected(&self.failing_transactions) {
                return Err(AppError::Store("injected transaction failure".to_string()));
            }
            let guard = Arc::clone(&self.state).lock_owned().await;
            let snapshot = guard.clone();
            Ok(Box::new(InMemoryTransaction {
                guard,
                snapshot,
                time_provider: Arc::clone(&self.time_provider),
                committed: false,
            }))
        }
    }

    struct InMemoryTransaction {
        guard: OwnedMutexGuard<State>,
        snapshot: State,
        time_provider: Arc<dyn TimeProvider>,
        committed: bool,
    }

    // Dropping without commit rolls back, as sqlx does
    impl Drop for InMemoryTransaction {
        fn drop(&mut self) {
            if !self.committed {
                *self.guard = std::mem::take(&mut self.snapshot);
            }
        }
    }

    #[async_trait]
    impl Transaction for InMemoryTransaction {
        async fn commit(mut self: Box<Self>) -> Result<()> {
            self.committed = true;
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl JobStoreTransaction for InMemoryTransaction {
        async fn fail(&mut self, id: &JobId, error: &str) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            Ok(self.guard.fail(id, error, now))
        }

        async fn schedule_retry(&mut self, id: &JobId, retry_at: i64) -> Result<()> {
            let now = self.time_provider.now_millis();
            self.guard.schedule_retry(id, retry_at, now);
            Ok(())
        }

        async fn move_to_dlq(&mut self, id: &JobId, error: &str) -> Result<()> {
            let now = self.time_provider.now_millis();
            self.guard.move_to_dlq(id, error, now);
            Ok(())
        }
    }
}
