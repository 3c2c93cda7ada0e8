// Command handlers

use crate::output;
use crate::settings::Settings;
use anyhow::{Context, Result};
use colored::Colorize;
use queuectl_core::application::{
    QueueService, RecoveryService, RetryPolicy, WorkerPool, WorkerSettings,
};
use queuectl_core::domain::JobState;
use queuectl_core::port::id_provider::UuidProvider;
use queuectl_core::port::time_provider::SystemTimeProvider;
use queuectl_core::port::{IdProvider, JobStore, TimeProvider};
use queuectl_core::AppError;
use queuectl_infra_system::ShellExecutor;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Config key holding the pid of the foreground `worker start` process
pub const WORKER_PID_KEY: &str = "worker_pid";

pub struct WorkerOptions {
    pub count: usize,
    pub poll_interval_ms: u64,
    pub recover_after_secs: Option<u64>,
}

/// Wired services for one CLI invocation
pub struct App {
    store: Arc<dyn JobStore>,
    queue: QueueService,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl App {
    pub async fn open(settings: &Settings) -> Result<Self> {
        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
        let store: Arc<dyn JobStore> = Arc::new(settings.open_store(time_provider.clone()).await?);
        let queue = QueueService::new(store.clone(), id_provider.clone(), time_provider.clone());

        Ok(Self {
            store,
            queue,
            time_provider,
            id_provider,
        })
    }

    pub async fn enqueue(&self, document: &str) -> Result<()> {
        let job = self.queue.enqueue_json(document).await?;

        println!("{}", format!("✓ Job {} enqueued", job.id).green().bold());
        println!();
        println!("{}", output::jobs_table(&[job]));
        Ok(())
    }

    pub async fn worker_start(&self, options: WorkerOptions) -> Result<()> {
        if options.count == 0 {
            anyhow::bail!("--count must be at least 1");
        }

        if let Some(secs) = options.recover_after_secs {
            let recovery = RecoveryService::new(self.store.clone(), self.time_provider.clone());
            let requeued = recovery
                .recover_stale(Duration::from_secs(secs))
                .await
                .context("Stale job recovery failed")?;
            info!(requeued = requeued, "Stale job recovery completed");
        }

        let pid = std::process::id();
        self.queue
            .config_set(WORKER_PID_KEY, Value::from(pid))
            .await
            .context("Failed to record worker pid")?;

        let pool = WorkerPool::new(
            self.store.clone(),
            Arc::new(ShellExecutor::new(self.time_provider.clone())),
            Arc::new(RetryPolicy::new(self.time_provider.clone())),
            self.id_provider.clone(),
            WorkerSettings {
                poll_interval: Duration::from_millis(options.poll_interval_ms),
                ..WorkerSettings::default()
            },
        );

        let ids = pool.start(options.count).await;
        println!(
            "{}",
            format!("✓ Started {} worker(s) (pid {})", ids.len(), pid)
                .green()
                .bold()
        );
        println!("Press Ctrl+C to stop");

        pool.run_until(shutdown_signal()).await;

        // Leave the key alone if another `worker start` has since taken over
        let recorded = self.queue.config_get(WORKER_PID_KEY).await?;
        if recorded.and_then(|v| v.as_u64()) == Some(u64::from(pid)) {
            self.queue.config_set(WORKER_PID_KEY, Value::Null).await?;
        }

        println!("{}", "✓ Workers stopped".green().bold());
        Ok(())
    }

    pub async fn worker_stop(&self) -> Result<()> {
        let pid = self
            .queue
            .config_get(WORKER_PID_KEY)
            .await?
            .and_then(|v| v.as_u64())
            .and_then(|p| i32::try_from(p).ok());

        let Some(pid) = pid else {
            println!("{}", "No running workers recorded".yellow());
            return Ok(());
        };

        if signal_terminate(pid)? {
            println!(
                "{}",
                format!("✓ Sent stop signal to worker process {}", pid)
                    .green()
                    .bold()
            );
        } else {
            warn!(pid = pid, "Recorded worker process is gone, clearing pid");
            self.queue.config_set(WORKER_PID_KEY, Value::Null).await?;
            println!("{}", "No running workers found".yellow());
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        let status = self.queue.status().await?;
        let worker_pid = self
            .queue
            .config_get(WORKER_PID_KEY)
            .await?
            .and_then(|v| v.as_u64())
            .and_then(|p| i32::try_from(p).ok())
            .filter(|pid| process_alive(*pid));

        println!("{}", "Queue Status".cyan().bold());
        println!();
        println!("{}", output::counts_table(&status));
        println!();

        match worker_pid {
            Some(pid) => println!("  {} running (pid {})", "Worker process:".bold(), pid),
            None => println!("  {} {}", "Worker process:".bold(), "not running".yellow()),
        }

        if !status.processing.is_empty() {
            println!();
            println!("{}", "Active jobs".cyan().bold());
            println!("{}", output::active_table(&status.processing));
        }
        Ok(())
    }

    pub async fn list(&self, state: Option<&str>) -> Result<()> {
        let state = state
            .map(|s| {
                s.parse::<JobState>()
                    .map_err(|e| AppError::InvalidSpec(e.to_string()))
            })
            .transpose()?;
        let jobs = self.queue.list(state).await?;

        if jobs.is_empty() {
            println!("{}", "No jobs".yellow());
        } else {
            println!("{}", output::jobs_table(&jobs));
        }
        Ok(())
    }

    pub async fn dlq_list(&self) -> Result<()> {
        let jobs = self.queue.dlq_list().await?;

        if jobs.is_empty() {
            println!("{}", "Dead letter queue is empty".green());
        } else {
            println!("{}", format!("Dead letter queue ({})", jobs.len()).red().bold());
            println!("{}", output::dead_table(&jobs));
        }
        Ok(())
    }

    pub async fn dlq_retry(&self, job_id: &str) -> Result<()> {
        self.queue.dlq_retry(&job_id.to_string()).await?;
        println!(
            "{}",
            format!("✓ Job {} moved back to pending", job_id).green().bold()
        );
        Ok(())
    }

    pub async fn config_set(&self, key: &str, raw: &str) -> Result<()> {
        let value = parse_config_value(raw);
        self.queue.config_set(key, value.clone()).await?;
        println!("{}", format!("✓ {} = {}", key, value).green().bold());
        Ok(())
    }

    pub async fn config_get(&self, key: &str) -> Result<()> {
        match self.queue.config_get(key).await? {
            Some(value) => {
                println!("{}", value);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("config key {}", key)).into()),
        }
    }
}

/// JSON if it parses, otherwise the raw text as a JSON string
pub fn parse_config_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, stopping workers..."),
        _ = terminate => info!("SIGTERM received, stopping workers..."),
    }
}

/// Send SIGTERM; false if no such process exists
#[cfg(unix)]
fn signal_terminate(pid: i32) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Failed to signal worker process {}: {}", pid, e)),
    }
}

#[cfg(not(unix))]
fn signal_terminate(_pid: i32) -> Result<bool> {
    anyhow::bail!("worker stop is only supported on unix")
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // EPERM still means the process exists
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    true
}
