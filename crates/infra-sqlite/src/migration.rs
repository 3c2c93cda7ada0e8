// Migration Runner

use crate::job_store::map_sqlx_error;
use queuectl_core::error::Result;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "Initial schema",
    include_str!("../migrations/001_initial_schema.sql"),
)];

/// Run database migrations
///
/// Safe to call on every start and from several processes at once: the
/// version is re-read under the write lock before anything is applied.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut conn = pool.acquire().await.map_err(map_sqlx_error)?;

    if current_version(&mut conn).await? >= latest_version() {
        return Ok(());
    }

    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

    match apply_pending(&mut conn).await {
        Ok(()) => {
            sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        }
        Err(e) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback_err, "Migration rollback failed");
                conn.close_on_drop();
            }
            Err(e)
        }
    }
}

fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |(version, _, _)| *version)
}

async fn current_version(conn: &mut SqliteConnection) -> Result<i64> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    if table_exists == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

async fn apply_pending(conn: &mut SqliteConnection) -> Result<()> {
    let current = current_version(conn).await?;
    for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        info!(version = version, "Applying migration {:03}: {}", version, name);
        apply_migration(conn, sql).await?;
    }
    Ok(())
}

/// Apply a single migration SQL file on an open transaction
async fn apply_migration(conn: &mut SqliteConnection, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
        }
    }
    Ok(())
}
