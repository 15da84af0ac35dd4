pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::error::AgentError;

pub use local::LocalExecutor;

/// Captured output of a finished process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, separated by a newline when both are present
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Trait for running a command string through a shell
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and return its output
    async fn execute(&self, command: &str) -> Result<ProcessOutput, AgentError>;

    /// Execute a command, giving up after `timeout`
    async fn execute_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ProcessOutput, AgentError>;
}
