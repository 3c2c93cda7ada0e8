// QueueCTL Infrastructure - SQLite Adapter
// Implements: JobStore, JobStoreTransaction

mod connection;
mod job_store;
mod migration;
mod transaction;

pub use connection::{create_pool, create_pool_at};
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;
pub use transaction::SqliteJobTransaction;

// Note: sqlx::Error conversion is handled by `job_store::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
