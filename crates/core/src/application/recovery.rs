// Stale job recovery
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Stale job recovery service
///
/// A worker that dies mid-command leaves its job in `processing` with a
/// stale `worker_id`. This service puts such jobs back to `pending` once
/// they have not been touched for longer than the recovery window. The
/// attempt count is kept, so a job that keeps killing its worker still
/// drains toward the DLQ through normal failures.
///
/// Opt-in: a legitimately long-running command older than the window would
/// be handed to a second worker.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Requeue `processing` jobs idle for longer than `older_than`
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_stale(&self, older_than: Duration) -> crate::error::Result<u64> {
        let window_ms = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(window_ms);

        info!(
            cutoff_time = %cutoff,
            recovery_window_ms = %window_ms,
            "Starting stale job recovery"
        );

        let recovered = self.store.requeue_stale(cutoff).await?;

        if recovered > 0 {
            warn!(recovered_count = %recovered, "Requeued stale processing jobs");
        } else {
            info!("No stale processing jobs found");
        }
        Ok(recovered)
    }
}
