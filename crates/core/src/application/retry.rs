// Retry logic: DLQ threshold and exponential backoff
use crate::domain::Job;
use crate::port::TimeProvider;
use std::sync::Arc;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job once `retry_at` (epoch ms) has passed
    Retry { delay_ms: i64, retry_at: i64 },
    /// Attempt budget exhausted, move to the dead letter queue
    DeadLetter,
}

/// Delay before the next attempt: `base ^ attempts` seconds, in ms.
///
/// Not capped; saturates at `i64::MAX` instead of overflowing.
pub fn backoff_delay_ms(backoff_base: f64, attempts: u32) -> i64 {
    let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
    let delay_ms = backoff_base.powi(exponent) * 1000.0;
    if !delay_ms.is_finite() || delay_ms >= i64::MAX as f64 {
        i64::MAX
    } else {
        delay_ms.round().max(0.0) as i64
    }
}

/// Retry policy
///
/// Determines what happens to a job that just failed, based on:
/// - Current attempt count (already incremented by `fail`)
/// - Maximum retries allowed
/// - Backoff base from config
pub struct RetryPolicy {
    time_provider: Arc<dyn TimeProvider>,
}

impl RetryPolicy {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }

    /// Decide between retry and DLQ for a just-failed job
    ///
    /// The DLQ threshold is checked before any backoff is computed: a job at
    /// exactly `max_retries` attempts is evicted, never rescheduled.
    ///
    /// # Example
    /// ```text
    /// match policy.decide(&failed_job, 2.0) {
    ///     RetryDecision::Retry { retry_at, .. } => tx.schedule_retry(&id, retry_at).await?,
    ///     RetryDecision::DeadLetter => tx.move_to_dlq(&id, &error).await?,
    /// }
    /// ```
    pub fn decide(&self, job: &Job, backoff_base: f64) -> RetryDecision {
        if job.attempts >= job.max_retries {
            warn!(
                job_id = %job.id,
                attempts = %job.attempts,
                max_retries = %job.max_retries,
                "Max retry attempts reached"
            );
            return RetryDecision::DeadLetter;
        }

        let delay_ms = backoff_delay_ms(backoff_base, job.attempts);
        let retry_at = self.time_provider.now_millis().saturating_add(delay_ms);

        info!(
            job_id = %job.id,
            attempt = %job.attempts,
            max_retries = %job.max_retries,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry { delay_ms, retry_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::port::time_provider::mocks::MockTimeProvider;

    fn failed_job(attempts: u32, max_retries: u32) -> Job {
        let mut job = Job::new_test("false");
        job.state = JobState::Failed;
        job.attempts = attempts;
        job.max_retries = max_retries;
        job
    }

    fn policy_at(now: i64) -> RetryPolicy {
        RetryPolicy::new(Arc::new(MockTimeProvider::new(now)))
    }

    #[test]
    fn test_backoff_grows_as_base_pow_attempts() {
        assert_eq!(backoff_delay_ms(2.0, 1), 2_000);
        assert_eq!(backoff_delay_ms(2.0, 2), 4_000);
        assert_eq!(backoff_delay_ms(2.0, 3), 8_000);
        assert_eq!(backoff_delay_ms(3.0, 2), 9_000);
        assert_eq!(backoff_delay_ms(1.5, 1), 1_500);
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        assert_eq!(backoff_delay_ms(10.0, 400), i64::MAX);
    }

    #[test]
    fn test_first_and_second_retry_delays() {
        let policy = policy_at(1_000_000);

        assert_eq!(
            policy.decide(&failed_job(1, 3), 2.0),
            RetryDecision::Retry {
                delay_ms: 2_000,
                retry_at: 1_002_000
            }
        );
        assert_eq!(
            policy.decide(&failed_job(2, 3), 2.0),
            RetryDecision::Retry {
                delay_ms: 4_000,
                retry_at: 1_004_000
            }
        );
    }

    #[test]
    fn test_job_at_max_retries_is_dead_lettered() {
        let policy = policy_at(0);
        assert_eq!(policy.decide(&failed_job(3, 3), 2.0), RetryDecision::DeadLetter);
        assert_eq!(policy.decide(&failed_job(1, 1), 2.0), RetryDecision::DeadLetter);
        assert_eq!(policy.decide(&failed_job(5, 3), 2.0), RetryDecision::DeadLetter);
    }

    #[test]
    fn test_retry_at_saturates() {
        let policy = policy_at(i64::MAX - 10);
        match policy.decide(&failed_job(1, 3), 2.0) {
            RetryDecision::Retry { retry_at, .. } => assert_eq!(retry_at, i64::MAX),
            other => panic!("unexpected decision: {:?}", other),
        }
    }
}
