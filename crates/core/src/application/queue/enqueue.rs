// Enqueue Use Case

use crate::domain::{config, Job, JobSpec, MAX_RETRIES_KEY};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};
use tracing::info;

/// Validate a job spec before anything touches the store
pub fn validate_spec(spec: &JobSpec) -> Result<()> {
    match spec.command.as_deref() {
        None => return Err(AppError::InvalidSpec("'command' is required".to_string())),
        Some(c) if c.trim().is_empty() => {
            return Err(AppError::InvalidSpec("'command' must not be empty".to_string()))
        }
        Some(_) => {}
    }

    if let Some(id) = spec.id.as_deref() {
        if id.trim().is_empty() {
            return Err(AppError::InvalidSpec("'id' must not be empty".to_string()));
        }
    }

    if spec.max_retries == Some(0) {
        return Err(AppError::InvalidSpec(
            "'max_retries' must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Execute enqueue use case
///
/// # Arguments
///
/// * `store` - Job store
/// * `id_provider` - ID generator for specs without an id (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `spec` - Job spec
pub async fn execute(
    store: &dyn JobStore,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    spec: JobSpec,
) -> Result<Job> {
    validate_spec(&spec)?;

    let max_retries = match spec.max_retries {
        Some(n) => n,
        None => config::max_retries(store.get_config(MAX_RETRIES_KEY).await?.as_ref()),
    };

    let id = spec.id.unwrap_or_else(|| id_provider.generate_id());
    let command = spec.command.unwrap_or_default();

    let job = Job::new(id, command, max_retries, time_provider.now_millis());
    store.enqueue(&job).await?;

    info!(job_id = %job.id, max_retries = job.max_retries, "Job enqueued");
    Ok(job)
}
