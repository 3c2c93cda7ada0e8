// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when no jobs are available (1s)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Sleep duration after a store error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// How many times a worker tries to report a job outcome to the store.
///
/// Once exhausted the job stays `processing` under this worker's id. Nothing
/// reclaims it until a later `worker start --recover-after-secs` requeues it.
pub const REPORT_RETRY_LIMIT: u32 = 3;
