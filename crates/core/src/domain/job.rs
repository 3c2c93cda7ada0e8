// Job Domain Model

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (client supplied or UUID v4)
pub type JobId = String;

/// Worker identity (UUID v4, one per worker loop)
pub type WorkerId = String;

/// Attempt ceiling applied when neither the job document nor the config sets one
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job State
///
/// ```text
/// pending -> processing -> completed
///                       -> failed -> processing (after backoff)
///                                 -> dead -> pending (explicit DLQ retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    /// All states, in lifecycle order
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Job submission as accepted from callers (JSON document on the CLI)
///
/// Every field is optional at the type level so that a missing `command`
/// surfaces as `InvalidSpec` instead of a JSON error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: Some(command.into()),
            max_retries: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Job Entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Opaque shell instruction, never parsed by the engine
    pub command: String,
    pub state: JobState,

    pub attempts: u32,
    pub max_retries: u32,

    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms

    /// Non-null iff state = processing
    pub worker_id: Option<WorkerId>,
    pub last_error: Option<String>,
    /// Epoch ms; only meaningful for failed jobs
    pub next_retry_at: Option<i64>,
}

impl Job {
    /// Create a new pending Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `command` - Shell command to run
    /// * `max_retries` - Attempt ceiling before the job is moved to the DLQ
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        max_retries: u32,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at,
            updated_at: created_at,
            worker_id: None,
            last_error: None,
            next_retry_at: None,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-1, test-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(command: impl Into<String>) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            command,
            DEFAULT_MAX_RETRIES,
            (counter * 1000) as i64,
        )
    }

    /// Acquisition predicate, evaluated in memory.
    ///
    /// The SQL adapter encodes the same rule in its acquire statement.
    pub fn is_eligible(&self, now_millis: i64) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Failed => {
                self.attempts < self.max_retries
                    && self.next_retry_at.map_or(true, |at| at <= now_millis)
            }
            _ => false,
        }
    }
}
