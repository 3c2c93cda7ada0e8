// SQLite Connection Pool Setup

use crate::job_store::map_sqlx_error;
use queuectl_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 10;

/// Create SQLite connection pool from a URL (`sqlite://...` or `sqlite::memory:`)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url).map_err(map_sqlx_error)?;
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    connect(options, in_memory).await
}

/// Create SQLite connection pool for a database file, creating it if missing
pub async fn create_pool_at(path: &Path) -> Result<SqlitePool> {
    connect(SqliteConnectOptions::new().filename(path), false).await
}

async fn connect(options: SqliteConnectOptions, in_memory: bool) -> Result<SqlitePool> {
    let options = options
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    // Every in-memory connection is its own database: pin exactly one
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    debug!(in_memory, "SQLite pool ready");
    Ok(pool)
}
