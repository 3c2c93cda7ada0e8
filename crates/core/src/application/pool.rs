// Worker Pool - supervises N worker loops

use crate::application::retry::RetryPolicy;
use crate::application::worker::{shutdown_channel, ShutdownSender, Worker, WorkerSettings};
use crate::domain::WorkerId;
use crate::error::Result;
use crate::port::{CommandExecutor, IdProvider, JobStore};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

struct RunningWorker {
    id: WorkerId,
    handle: JoinHandle<Result<()>>,
}

#[derive(Default)]
struct PoolState {
    shutdown: Option<ShutdownSender>,
    workers: Vec<RunningWorker>,
}

/// Owns the running workers and their shared shutdown channel.
///
/// The pool never installs OS signal handlers. The hosting process traps
/// signals itself and calls [`WorkerPool::stop`], or hands a future to
/// [`WorkerPool::run_until`].
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    retry_policy: Arc<RetryPolicy>,
    id_provider: Arc<dyn IdProvider>,
    settings: WorkerSettings,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        retry_policy: Arc<RetryPolicy>,
        id_provider: Arc<dyn IdProvider>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            executor,
            retry_policy,
            id_provider,
            settings,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Spawn `count` workers, each with a freshly generated identity.
    ///
    /// Calling `start` again adds workers to the running set.
    pub async fn start(&self, count: usize) -> Vec<WorkerId> {
        let mut state = self.state.lock().await;
        let token = state
            .shutdown
            .get_or_insert_with(|| shutdown_channel().0)
            .subscribe();

        let mut started = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.id_provider.generate_id();
            let worker = Worker::new(
                id.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.executor),
                Arc::clone(&self.retry_policy),
                self.settings.clone(),
            );
            let token = token.clone();
            let handle = tokio::spawn(async move { worker.run(token).await });

            state.workers.push(RunningWorker {
                id: id.clone(),
                handle,
            });
            started.push(id);
        }

        info!(count = count, running = state.workers.len(), "Workers started");
        started
    }

    /// Number of workers started and not yet stopped
    pub async fn running(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    /// Signal every worker to stop and wait for all of them to exit.
    ///
    /// In-flight jobs finish and are reported before their worker exits.
    /// Safe to call repeatedly and concurrently: a second caller waits on
    /// the pool lock until the first join completes, then finds nothing left.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(shutdown) = state.shutdown.take() else {
            return;
        };

        info!(workers = state.workers.len(), "Stopping all workers...");
        shutdown.shutdown();

        let workers = std::mem::take(&mut state.workers);
        let ids: Vec<WorkerId> = workers.iter().map(|w| w.id.clone()).collect();
        let results = join_all(workers.into_iter().map(|w| w.handle)).await;

        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker_id = %id, error = %e, "Worker exited with error"),
                Err(join_err) => error!(worker_id = %id, error = %join_err, "Worker task failed"),
            }
        }

        info!("All workers stopped");
    }

    /// Wait for `signal` to resolve, then stop the pool
    pub async fn run_until<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.stop().await;
    }
}
