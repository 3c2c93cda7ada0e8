// Command Executor Port
// Abstraction for running a job's shell command

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a command that ran to completion (or was stopped by a signal)
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Failure description recorded as the job's `last_error`
    pub fn failure_message(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        match self.stderr.trim() {
            "" => status,
            stderr => format!("{}: {}", status, stderr),
        }
    }
}

/// Execution errors (the command could not be run to completion)
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Command Executor trait
///
/// Implementations:
/// - ShellExecutor: `sh -c <command>` as a child process
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` until it exits
    ///
    /// A non-zero exit is still `Ok`; inspect `CommandOutput::exit_code`.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the process cannot be started
    /// - ExecutionError::Timeout if `timeout` elapses first (the child is killed)
    async fn run(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always exit 0
        Success,
        /// Always exit with code and stderr
        Exit(i32, String),
        /// Fail to spawn with message
        SpawnFail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep, then exit 0
        Slow(Duration),
    }

    /// Mock Command Executor for testing
    pub struct MockCommandExecutor {
        behavior: MockBehavior,
        commands: Arc<Mutex<Vec<String>>>,
    }

    impl MockCommandExecutor {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                commands: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_exit(code: i32, stderr: impl Into<String>) -> Self {
            Self::new(MockBehavior::Exit(code, stderr.into()))
        }
        pub fn call_count(&self) -> usize {
            self.commands.lock().unwrap().len()
        }
        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn run(
            &self,
            command: &str,
            _timeout: Option<Duration>,
        ) -> Result<CommandOutput, ExecutionError> {
            self.commands.lock().unwrap().push(command.to_string());

            let behavior = self.behavior.clone();

            let output = |exit_code: i32, stderr: String| CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr,
                duration_ms: 1,
            };

            match behavior {
                MockBehavior::Success => Ok(output(0, String::new())),
                MockBehavior::Exit(code, stderr) => Ok(output(code, stderr)),
                MockBehavior::SpawnFail(msg) => Err(ExecutionError::SpawnFailed(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
                MockBehavior::Slow(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(output(0, String::new()))
                }
            }
        }
    }
}
