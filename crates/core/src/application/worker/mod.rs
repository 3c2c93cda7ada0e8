// Worker - Job execution loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{config, Job, WorkerId, BACKOFF_BASE_KEY, JOB_TIMEOUT_KEY};
use crate::error::Result;
use crate::port::{CommandExecutor, JobStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Polling knobs for a worker loop
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Sleep between polls when the queue has nothing eligible
    pub poll_interval: Duration,
    /// Sleep after a store error before polling again
    pub error_sleep: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: IDLE_SLEEP_DURATION,
            error_sleep: ERROR_RECOVERY_SLEEP_DURATION,
        }
    }
}

/// How a single execution attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Failed with the message recorded as `last_error`
    Failed(String),
}

/// Worker pulls jobs from the store and runs their commands
pub struct Worker {
    id: WorkerId,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    retry_policy: Arc<RetryPolicy>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        id: impl Into<WorkerId>,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        retry_policy: Arc<RetryPolicy>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            executor,
            retry_policy,
            settings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// Shutdown is only observed between jobs and while idle; a running
    /// command always finishes and its outcome is reported first.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker_id = %self.id, "Worker started");
        loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                info!(worker_id = %self.id, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    // No job available, sleep briefly (or wait for shutdown)
                    tokio::select! {
                        _ = sleep(self.settings.poll_interval) => {},
                        _ = shutdown.wait() => {
                            info!(worker_id = %self.id, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    // Store trouble is transient: log and poll again later
                    error!(worker_id = %self.id, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(self.settings.error_sleep) => {},
                        _ = shutdown.wait() => {
                            info!(worker_id = %self.id, "Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    /// Process next job from the queue (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        // Acquire is atomic: the row is already `processing` with our id
        let job = match self.store.acquire(&self.id).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        info!(
            worker_id = %self.id,
            job_id = %job.id,
            attempt = job.attempts + 1,
            max_retries = job.max_retries,
            "Processing job"
        );

        let outcome = self.execute(&job).await;
        self.report_with_retry(&job, &outcome).await?;
        Ok(true)
    }

    /// Run the job's command on its own task so a panicking executor only
    /// fails this job
    async fn execute(&self, job: &Job) -> JobOutcome {
        let timeout = self.job_timeout().await;
        let executor = Arc::clone(&self.executor);
        let command = job.command.clone();

        let handle = tokio::task::spawn(async move { executor.run(&command, timeout).await });

        match handle.await {
            Ok(Ok(output)) if output.success() => {
                info!(
                    job_id = %job.id,
                    duration_ms = output.duration_ms,
                    "Job command succeeded"
                );
                JobOutcome::Completed
            }
            Ok(Ok(output)) => {
                warn!(
                    job_id = %job.id,
                    exit_code = ?output.exit_code,
                    duration_ms = output.duration_ms,
                    "Job command failed"
                );
                JobOutcome::Failed(output.failure_message())
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.id, error = %e, "Job command could not run");
                JobOutcome::Failed(e.to_string())
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(job_id = %job.id, "Executor panicked");
                    JobOutcome::Failed("executor panicked".to_string())
                } else {
                    error!(job_id = %job.id, "Execution task cancelled");
                    JobOutcome::Failed("execution cancelled".to_string())
                }
            }
        }
    }

    /// Per-job deadline from config; a store error here must not strand the
    /// already-acquired job, so it degrades to "no deadline"
    async fn job_timeout(&self) -> Option<Duration> {
        match self.store.get_config(JOB_TIMEOUT_KEY).await {
            Ok(value) => config::job_timeout(value.as_ref()),
            Err(e) => {
                warn!(error = %e, "Could not read job_timeout, running without deadline");
                None
            }
        }
    }

    async fn report_with_retry(&self, job: &Job, outcome: &JobOutcome) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.report(job, outcome).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_store() && attempt < REPORT_RETRY_LIMIT => {
                    warn!(
                        job_id = %job.id,
                        attempt = attempt,
                        error = %e,
                        "Failed to report job outcome, retrying"
                    );
                    attempt += 1;
                    sleep(self.settings.error_sleep).await;
                }
                Err(e) => {
                    error!(
                        job_id = %job.id,
                        attempts = attempt,
                        error = %e,
                        "Giving up on reporting job outcome, job left in processing"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn report(&self, job: &Job, outcome: &JobOutcome) -> Result<()> {
        match outcome {
            JobOutcome::Completed => {
                self.store.complete(&job.id).await?;
                info!(job_id = %job.id, "Job completed");
                Ok(())
            }
            JobOutcome::Failed(error) => self.record_failure(job, error).await,
        }
    }

    /// Fail, then retry-or-DLQ, in one transaction
    async fn record_failure(&self, job: &Job, error: &str) -> Result<()> {
        // Read config before taking the write lock
        let backoff_base = config::backoff_base(
            self.store.get_config(BACKOFF_BASE_KEY).await?.as_ref(),
        );

        let mut tx = self.store.begin_transaction().await?;

        let failed = match tx.fail(&job.id, error).await? {
            Some(failed) => failed,
            None => {
                // Someone else moved the job on (e.g. stale recovery)
                warn!(job_id = %job.id, "Job no longer processing, dropping failure report");
                tx.rollback().await?;
                return Ok(());
            }
        };

        match self.retry_policy.decide(&failed, backoff_base) {
            RetryDecision::Retry { delay_ms, retry_at } => {
                tx.schedule_retry(&failed.id, retry_at).await?;
                debug!(job_id = %failed.id, delay_ms = delay_ms, "Backoff recorded");
            }
            RetryDecision::DeadLetter => {
                tx.move_to_dlq(&failed.id, error).await?;
                warn!(
                    job_id = %failed.id,
                    attempts = failed.attempts,
                    error = %error,
                    "Job moved to dead letter queue"
                );
            }
        }

        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobState, BACKOFF_BASE_KEY};
    use crate::port::command_executor::mocks::{MockBehavior, MockCommandExecutor};
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::TimeProvider;

    const START: i64 = 1_700_000_000_000;

    struct Harness {
        clock: Arc<MockTimeProvider>,
        store: Arc<InMemoryJobStore>,
        executor: Arc<MockCommandExecutor>,
        worker: Worker,
    }

    fn harness(executor: MockCommandExecutor) -> Harness {
        let clock = Arc::new(MockTimeProvider::new(START));
        let time_provider: Arc<dyn TimeProvider> = clock.clone();
        let store = Arc::new(InMemoryJobStore::new(time_provider.clone()));
        let executor = Arc::new(executor);
        let worker = Worker::new(
            "worker-1",
            store.clone(),
            executor.clone(),
            Arc::new(RetryPolicy::new(time_provider)),
            WorkerSettings {
                poll_interval: Duration::from_millis(10),
                error_sleep: Duration::from_millis(10),
            },
        );
        Harness {
            clock,
            store,
            executor,
            worker,
        }
    }

    async fn enqueue(h: &Harness, id: &str, command: &str, max_retries: u32) {
        let job = Job::new(id, command, max_retries, h.clock.now_millis());
        h.store.enqueue(&job).await.unwrap();
    }

    async fn get(h: &Harness, id: &str) -> Job {
        h.store.get(&id.to_string()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_empty_queue_processes_nothing() {
        let h = harness(MockCommandExecutor::new_success());
        assert!(!h.worker.process_next_job().await.unwrap());
        assert_eq!(h.executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_command_completes_job() {
        let h = harness(MockCommandExecutor::new_success());
        enqueue(&h, "a", "true", 3).await;

        assert!(h.worker.process_next_job().await.unwrap());

        let job = get(&h, "a").await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 0);
        assert!(job.worker_id.is_none());
        assert_eq!(h.executor.commands(), vec!["true".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_command_schedules_backoff() {
        let h = harness(MockCommandExecutor::new_exit(1, "boom"));
        enqueue(&h, "b", "false", 3).await;

        h.worker.process_next_job().await.unwrap();

        let job = get(&h, "b").await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("exit code 1: boom"));
        assert_eq!(job.next_retry_at, Some(START + 2_000));
        assert!(job.worker_id.is_none());
    }

    #[tokio::test]
    async fn test_backoff_blocks_reacquisition_until_due() {
        let h = harness(MockCommandExecutor::new_exit(1, ""));
        enqueue(&h, "b", "false", 3).await;
        h.worker.process_next_job().await.unwrap();

        h.clock.advance(1_999);
        assert!(!h.worker.process_next_job().await.unwrap());

        h.clock.advance(1);
        assert!(h.worker.process_next_job().await.unwrap());

        let job = get(&h, "b").await;
        assert_eq!(job.attempts, 2);
        // second retry waits base^2
        assert_eq!(job.next_retry_at, Some(START + 2_000 + 4_000));
    }

    #[tokio::test]
    async fn test_job_dead_after_exactly_max_retries() {
        let h = harness(MockCommandExecutor::new_exit(1, "nope"));
        enqueue(&h, "b", "false", 2).await;

        h.worker.process_next_job().await.unwrap();
        assert_eq!(get(&h, "b").await.state, JobState::Failed);

        h.clock.advance(2_000);
        h.worker.process_next_job().await.unwrap();

        let job = get(&h, "b").await;
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("exit code 1: nope"));
        assert!(job.next_retry_at.is_none());
        assert_eq!(h.executor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_single_retry_budget_goes_straight_to_dlq() {
        let h = harness(MockCommandExecutor::new_exit(1, ""));
        enqueue(&h, "b", "false", 1).await;

        h.worker.process_next_job().await.unwrap();

        assert_eq!(get(&h, "b").await.state, JobState::Dead);
    }

    #[tokio::test]
    async fn test_spawn_failure_counts_as_failed_attempt() {
        let h = harness(MockCommandExecutor::new(MockBehavior::SpawnFail(
            "No such file or directory".to_string(),
        )));
        enqueue(&h, "c", "missing-binary", 3).await;

        h.worker.process_next_job().await.unwrap();

        let job = get(&h, "c").await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.last_error.as_deref(),
            Some("Spawn failed: No such file or directory")
        );
    }

    #[tokio::test]
    async fn test_executor_panic_fails_job_not_worker() {
        let h = harness(MockCommandExecutor::new(MockBehavior::Panic(
            "kaboom".to_string(),
        )));
        enqueue(&h, "p", "true", 3).await;

        assert!(h.worker.process_next_job().await.unwrap());

        let job = get(&h, "p").await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.last_error.as_deref(), Some("executor panicked"));
    }

    #[tokio::test]
    async fn test_backoff_base_read_from_config() {
        let h = harness(MockCommandExecutor::new_exit(2, ""));
        h.store
            .set_config(BACKOFF_BASE_KEY, &serde_json::json!(3))
            .await
            .unwrap();
        enqueue(&h, "b", "false", 3).await;

        h.worker.process_next_job().await.unwrap();

        assert_eq!(get(&h, "b").await.next_retry_at, Some(START + 3_000));
    }

    #[tokio::test]
    async fn test_fifo_by_created_at() {
        let h = harness(MockCommandExecutor::new_success());
        enqueue(&h, "first", "echo 1", 3).await;
        h.clock.advance(5);
        enqueue(&h, "second", "echo 2", 3).await;

        h.worker.process_next_job().await.unwrap();

        assert_eq!(get(&h, "first").await.state, JobState::Completed);
        assert_eq!(get(&h, "second").await.state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_run_survives_store_error_and_stops_on_shutdown() {
        let h = harness(MockCommandExecutor::new_success());
        h.store.fail_next_acquire();
        enqueue(&h, "a", "true", 3).await;

        let (tx, token) = shutdown_channel();
        let worker = Arc::new(h.worker);
        let runner = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.run(token).await })
        };

        // the first poll errors, a later one picks the job up
        for _ in 0..100 {
            if get_state(&h.store, "a").await == JobState::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(get_state(&h.store, "a").await, JobState::Completed);

        tx.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), runner).await;
        assert!(result.is_ok(), "Worker should shutdown within 2 seconds");
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_command() {
        let h = harness(MockCommandExecutor::new(MockBehavior::Slow(
            Duration::from_millis(200),
        )));
        enqueue(&h, "slow", "sleep 0.2", 3).await;

        let (tx, token) = shutdown_channel();
        let worker = Arc::new(h.worker);
        let runner = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.run(token).await })
        };

        // wait until the job is claimed, then ask the worker to stop
        for _ in 0..100 {
            if get_state(&h.store, "slow").await == JobState::Processing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.shutdown();
        runner.await.unwrap().unwrap();

        assert_eq!(get_state(&h.store, "slow").await, JobState::Completed);
    }

    #[tokio::test]
    async fn test_transient_complete_error_is_retried() {
        let h = harness(MockCommandExecutor::new_success());
        enqueue(&h, "a", "true", 3).await;
        h.store.fail_next_completes(REPORT_RETRY_LIMIT - 1);

        assert!(h.worker.process_next_job().await.unwrap());

        assert_eq!(get(&h, "a").await.state, JobState::Completed);
        assert_eq!(h.executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_transaction_error_is_retried() {
        let h = harness(MockCommandExecutor::new_exit(1, "nope"));
        enqueue(&h, "a", "false", 3).await;
        h.store.fail_next_transactions(REPORT_RETRY_LIMIT - 1);

        assert!(h.worker.process_next_job().await.unwrap());

        let job = get(&h, "a").await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.next_retry_at, Some(START + 2_000));
        assert_eq!(h.executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_report_leaves_job_processing() {
        let h = harness(MockCommandExecutor::new_success());
        enqueue(&h, "a", "true", 3).await;
        h.store.fail_next_completes(REPORT_RETRY_LIMIT);

        let err = h.worker.process_next_job().await.unwrap_err();
        assert!(err.is_store());

        let job = get(&h, "a").await;
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.worker_id.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn test_run_survives_exhausted_report() {
        let h = harness(MockCommandExecutor::new_success());
        enqueue(&h, "stuck", "true", 3).await;
        h.store.fail_next_completes(REPORT_RETRY_LIMIT);

        let (tx, token) = shutdown_channel();
        let worker = Arc::new(h.worker);
        let runner = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.run(token).await })
        };

        // wait for the stranded job, then give the loop a job it can finish
        for _ in 0..100 {
            if h.store.list(Some(JobState::Processing)).await.unwrap().len() == 1
                && h.executor.call_count() == 1
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let next = Job::new("next", "true", 3, h.clock.now_millis());
        h.store.enqueue(&next).await.unwrap();
        for _ in 0..200 {
            if get_state(&h.store, "next").await == JobState::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(get_state(&h.store, "next").await, JobState::Completed);
        assert_eq!(get_state(&h.store, "stuck").await, JobState::Processing);

        tx.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), runner).await;
        assert!(result.is_ok(), "Worker should shutdown within 2 seconds");
        assert!(result.unwrap().unwrap().is_ok());
    }

    async fn get_state(store: &InMemoryJobStore, id: &str) -> JobState {
        store.get(&id.to_string()).await.unwrap().unwrap().state
    }
}
