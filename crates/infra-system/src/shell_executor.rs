// Shell command executor
// reason: tokio::process for async child management, nix for process-group kill
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use queuectl_core::port::{CommandExecutor, CommandOutput, ExecutionError, TimeProvider};

/// Runs each job command through `sh -c`, capturing stdout and stderr.
///
/// On unix the child leads its own process group, so a terminal Ctrl-C aimed
/// at the worker does not interrupt in-flight jobs, and a timeout can kill
/// the whole pipeline the shell started.
pub struct ShellExecutor {
    time_provider: Arc<dyn TimeProvider>,
    shell: String,
}

impl ShellExecutor {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            shell: "sh".to_string(),
        }
    }

    /// Use a different POSIX shell (must accept `-c <command>`)
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    fn build_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<CommandOutput, ExecutionError> {
        let start_time = self.time_provider.now_millis();

        let child = self
            .build_command(command)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        debug!(command = %command, pid = ?pid, timeout = ?limit, "Spawned job command");

        let output = match limit {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result.map_err(|e| ExecutionError::IoError(e.to_string()))?,
                Err(_) => {
                    // Dropping the future already killed the shell itself
                    kill_process_group(pid);
                    return Err(ExecutionError::Timeout(limit.as_millis() as u64));
                }
            },
            None => child
                .wait_with_output()
                .await
                .map_err(|e| ExecutionError::IoError(e.to_string()))?,
        };

        let duration_ms = self.time_provider.now_millis() - start_time;
        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        };

        debug!(
            command = %command,
            duration_ms = %duration_ms,
            exit_code = ?result.exit_code,
            "Job command exited"
        );

        Ok(result)
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    // ESRCH just means everything already exited
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            warn!(pid = %pid, error = %e, "Failed to kill timed-out process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use queuectl_core::port::time_provider::SystemTimeProvider;
    use std::time::Instant;

    fn executor() -> ShellExecutor {
        ShellExecutor::new(Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_successful_command() {
        let output = executor().run("echo hello", None).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.duration_ms >= 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let output = executor().run("exit 3", None).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.failure_message(), "exit code 3");
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let output = executor()
            .run("echo oops >&2; false", None)
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(1));
        assert_eq!(output.failure_message(), "exit code 1: oops");
    }

    #[tokio::test]
    async fn test_shell_features_are_available() {
        let output = executor()
            .run("X=4; echo $((X * 2)) | tr -d '\\n'", None)
            .await
            .unwrap();
        assert_eq!(output.stdout, "8");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let started = Instant::now();
        let err = executor()
            .run("sleep 5", Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(100)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_failure() {
        let err = executor()
            .with_shell("/nonexistent/shell")
            .run("true", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::SpawnFailed(_)));
    }
}
