// Application Layer - Use Cases and Business Logic

pub mod pool;
pub mod queue;
pub mod recovery;
pub mod retry;
pub mod worker;

// Re-exports
pub use pool::WorkerPool;
pub use queue::{QueueService, QueueStatus};
pub use recovery::RecoveryService;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerSettings};
