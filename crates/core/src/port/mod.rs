// Port Layer - Interfaces for external dependencies

pub mod command_executor;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use command_executor::{CommandExecutor, CommandOutput, ExecutionError};
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use time_provider::TimeProvider;
pub use transaction::{JobStoreTransaction, Transaction};
