// SQLite JobStore Implementation

use crate::SqliteJobTransaction;
use async_trait::async_trait;
use queuectl_core::domain::{DomainError, Job, JobId, JobState};
use queuectl_core::error::{AppError, Result};
use queuectl_core::port::{JobStore, JobStoreTransaction, TimeProvider};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    // UNIQUE / PRIMARY KEY constraint failed; only `enqueue`
                    // knows when that means a duplicate job id
                    "2067" | "1555" => AppError::Store(format!(
                        "Constraint violation: {}",
                        db_err.message()
                    )),
                    "5" => AppError::Store(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Store(format!("Database full: {}", db_err.message())),
                    _ => AppError::Store(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Store(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Store("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Store(format!("Column not found: {}", col)),
        _ => AppError::Store(err.to_string()),
    }
}

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, command, state, attempts, max_retries,
                created_at, updated_at, worker_id, last_error, next_retry_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(&job.worker_id)
        .bind(&job.last_error)
        .bind(job.next_retry_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::DuplicateId(job.id.clone()))
            }
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    async fn acquire(&self, worker_id: &str) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();

        // Select and claim in one statement; the outer state check makes a
        // racing writer that already claimed the row a no-op.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, worker_id = ?, next_retry_at = NULL, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = ?
                   OR (state = ?
                       AND attempts < max_retries
                       AND (next_retry_at IS NULL OR next_retry_at <= ?))
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            AND state IN (?, ?)
            RETURNING *
            "#,
        )
        .bind(JobState::Processing.as_str())
        .bind(worker_id)
        .bind(now)
        .bind(JobState::Pending.as_str())
        .bind(JobState::Failed.as_str())
        .bind(now)
        .bind(JobState::Pending.as_str())
        .bind(JobState::Failed.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn complete(&self, id: &JobId) -> Result<()> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, worker_id = NULL, updated_at = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(JobState::Completed.as_str())
        .bind(now)
        .bind(id)
        .bind(JobState::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            debug!(job_id = %id, "complete ignored: job missing or not processing");
        }
        Ok(())
    }

    async fn fail(&self, id: &JobId, error: &str) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        fail_job(&self.pool, id, error, now).await
    }

    async fn schedule_retry(&self, id: &JobId, retry_at: i64) -> Result<()> {
        let now = self.time_provider.now_millis();
        schedule_retry_job(&self.pool, id, retry_at, now).await
    }

    async fn move_to_dlq(&self, id: &JobId, error: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        move_job_to_dlq(&self.pool, id, error, now).await
    }

    async fn retry_from_dlq(&self, id: &JobId) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, attempts = 0, worker_id = NULL, last_error = NULL,
                next_retry_at = NULL, updated_at = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(JobState::Pending.as_str())
        .bind(now)
        .bind(id)
        .bind(JobState::Dead.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE state = ? ORDER BY created_at ASC, rowid ASC",
                )
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM jobs ORDER BY created_at ASC, rowid ASC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn count_by_state(&self) -> Result<BTreeMap<JobState, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut counts: BTreeMap<JobState, i64> = JobState::ALL.iter().map(|s| (*s, 0)).collect();
        for (state, count) in rows {
            counts.insert(state.parse::<JobState>()?, count);
        }
        Ok(counts)
    }

    async fn requeue_stale(&self, cutoff_millis: i64) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, worker_id = NULL, updated_at = ?
            WHERE state = ? AND updated_at < ?
            "#,
        )
        .bind(JobState::Pending.as_str())
        .bind(now)
        .bind(JobState::Processing.as_str())
        .bind(cutoff_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO config (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn JobStoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteJobTransaction::new(
            tx,
            Arc::clone(&self.time_provider),
        )))
    }
}

// Row-level transitions shared by the pool-backed store and its transactions

pub(crate) async fn fail_job<'c, E>(
    executor: E,
    id: &str,
    error: &str,
    now: i64,
) -> Result<Option<Job>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs
        SET state = ?, attempts = attempts + 1, last_error = ?, worker_id = NULL, updated_at = ?
        WHERE id = ? AND state = ?
        RETURNING *
        "#,
    )
    .bind(JobState::Failed.as_str())
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(JobState::Processing.as_str())
    .fetch_optional(executor)
    .await
    .map_err(map_sqlx_error)?;

    row.map(JobRow::into_job).transpose()
}

pub(crate) async fn schedule_retry_job<'c, E>(
    executor: E,
    id: &str,
    retry_at: i64,
    now: i64,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE jobs SET next_retry_at = ?, updated_at = ? WHERE id = ? AND state = ?")
        .bind(retry_at)
        .bind(now)
        .bind(id)
        .bind(JobState::Failed.as_str())
        .execute(executor)
        .await
        .map_err(map_sqlx_error)?;

    Ok(())
}

pub(crate) async fn move_job_to_dlq<'c, E>(
    executor: E,
    id: &str,
    error: &str,
    now: i64,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE jobs
        SET state = ?, last_error = ?, worker_id = NULL, next_retry_at = NULL, updated_at = ?
        WHERE id = ? AND state IN (?, ?, ?)
        "#,
    )
    .bind(JobState::Dead.as_str())
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(JobState::Pending.as_str())
    .bind(JobState::Processing.as_str())
    .bind(JobState::Failed.as_str())
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: i64,
    updated_at: i64,
    worker_id: Option<String>,
    last_error: Option<String>,
    next_retry_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let state: JobState = self.state.parse()?;
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| DomainError::InvalidCount("attempts", self.attempts))?;
        let max_retries = u32::try_from(self.max_retries)
            .map_err(|_| DomainError::InvalidCount("max_retries", self.max_retries))?;

        Ok(Job {
            id: self.id,
            command: self.command,
            state,
            attempts,
            max_retries,
            created_at: self.created_at,
            updated_at: self.updated_at,
            worker_id: self.worker_id,
            last_error: self.last_error,
            next_retry_at: self.next_retry_at,
        })
    }
}
