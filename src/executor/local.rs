use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use super::{CommandExecutor, ProcessOutput};
use crate::models::error::AgentError;

/// Executor for commands on the local machine
pub struct LocalExecutor {
    working_dir: Option<PathBuf>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self { working_dir: None }
    }

    /// Run commands from `dir` instead of the current directory
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }

    /// Get the shell and shell argument for the current platform
    fn get_shell_command() -> (&'static str, &'static str) {
        if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        }
    }

    async fn execute_internal(&self, command: &str) -> Result<ProcessOutput, AgentError> {
        let start = Instant::now();
        let (shell, shell_arg) = Self::get_shell_command();

        let mut process = Command::new(shell);
        process
            .arg(shell_arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        tracing::info!("Executing command: {}", command);

        let output = process
            .output()
            .await
            .map_err(|e| AgentError::CommandExecutionFailed {
                command: command.to_string(),
                exit_code: -1,
                stderr: e.to_string(),
            })?;

        let execution_time_ms = start.elapsed().as_millis() as u64;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            execution_time_ms,
        })
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, command: &str) -> Result<ProcessOutput, AgentError> {
        self.execute_internal(command).await
    }

    async fn execute_with_timeout(
        &self,
        command: &str,
        timeout_duration: Duration,
    ) -> Result<ProcessOutput, AgentError> {
        match timeout(timeout_duration, self.execute_internal(command)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(format!(
                "Command timed out after {}ms: {}",
                timeout_duration.as_millis(),
                command
            ))),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_executor_echo() {
        let executor = LocalExecutor::new();
        let result = executor.execute("echo hello").await.unwrap();
        assert!(result.success());
        assert!(result.stdout.trim().contains("hello"));
    }

    #[tokio::test]
    async fn test_local_executor_failure() {
        let executor = LocalExecutor::new();
        let result = executor.execute("exit 3").await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_local_executor_captures_stderr_separately() {
        let executor = LocalExecutor::new();
        let result = executor.execute("echo out; echo err 1>&2").await.unwrap();
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_local_executor_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let executor = LocalExecutor::with_working_dir(dir.path());
        let result = executor.execute("ls").await.unwrap();
        assert!(result.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_local_executor_timeout() {
        let executor = LocalExecutor::new();
        let err = executor
            .execute_with_timeout("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }
}
