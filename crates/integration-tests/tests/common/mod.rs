//! Shared fixtures: a file-backed queue in a temp directory

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use queuectl_core::application::{QueueService, RetryPolicy, WorkerPool, WorkerSettings};
use queuectl_core::domain::{Job, JobState};
use queuectl_core::port::id_provider::UuidProvider;
use queuectl_core::port::time_provider::SystemTimeProvider;
use queuectl_core::port::{JobStore, TimeProvider};
use queuectl_infra_sqlite::{create_pool_at, run_migrations, SqliteJobStore};
use queuectl_infra_system::ShellExecutor;
use tempfile::TempDir;

pub struct TestQueue {
    pub dir: TempDir,
    pub store: Arc<SqliteJobStore>,
    pub service: QueueService,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl TestQueue {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::open_in(dir).await
    }

    /// Open a fresh store over the same database file
    pub async fn reopen(self) -> Self {
        let TestQueue {
            dir,
            store,
            service,
            ..
        } = self;
        drop(service);
        drop(store);
        Self::open_in(dir).await
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("jobs.db")
    }

    async fn open_in(dir: TempDir) -> Self {
        let pool = create_pool_at(&dir.path().join("jobs.db")).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let store = Arc::new(SqliteJobStore::new(pool, time_provider.clone()));
        let service = QueueService::new(
            store.clone(),
            Arc::new(UuidProvider),
            time_provider.clone(),
        );

        Self {
            dir,
            store,
            service,
            time_provider,
        }
    }

    /// Worker pool over the real shell executor with fast polling
    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.store.clone(),
            Arc::new(ShellExecutor::new(self.time_provider.clone())),
            Arc::new(RetryPolicy::new(self.time_provider.clone())),
            Arc::new(UuidProvider),
            WorkerSettings {
                poll_interval: Duration::from_millis(20),
                error_sleep: Duration::from_millis(20),
            },
        )
    }

    pub async fn job(&self, id: &str) -> Job {
        self.store.get(&id.to_string()).await.unwrap().unwrap()
    }

    /// Poll until the job reaches `state` or the deadline passes
    pub async fn wait_for_state(&self, id: &str, state: JobState, within: Duration) -> Job {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let job = self.job(id).await;
            if job.state == state || tokio::time::Instant::now() >= deadline {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll until `count` jobs are in `state`
    pub async fn wait_for_count(&self, state: JobState, count: usize, within: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let n = self.store.list(Some(state)).await.unwrap().len();
            if n >= count || tokio::time::Instant::now() >= deadline {
                return n;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
