//! Command Execution Gate
//!
//! Last check before a confirmed command reaches the shell. The command is
//! validated again, run through a [`CommandExecutor`], and its output captured
//! for display.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::safety::validate_command;
use crate::executor::CommandExecutor;
use crate::models::{Command, CommandStatus, EXIT_CODE_BLOCKED, EXIT_CODE_UNSET};

/// Output longer than this many characters is truncated for display
pub const MAX_DISPLAY_OUTPUT: usize = 2000;

const TRUNCATION_NOTICE: &str = "\n...\n(Output truncated for display)";
const NO_OUTPUT_MESSAGE: &str = "Command executed successfully (no output)";
const BLOCKED_RESULT: &str = "Command blocked for security reasons";
const BLOCKED_OUTPUT: &str = "Command execution blocked for security reasons.";
const BLOCKED_ERROR: &str = "potentially unsafe command";

/// Outcome of running one command through the gate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command: Command,
    pub output: String,
    pub error: Option<String>,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Markdown block appended to the conversation view
    pub fn to_markdown(&self) -> String {
        let mut result = String::new();

        match &self.error {
            None => {
                result.push_str("## Command executed successfully\n\n");
                push_command(&mut result, &self.command.raw);
                if self.output.is_empty() {
                    result.push_str("Command completed with no output.");
                } else {
                    push_output(&mut result, &self.output);
                }
            }
            Some(error) => {
                result.push_str("## Error executing command\n\n");
                push_command(&mut result, &self.command.raw);
                result.push_str("### Error details\n\n");
                result.push_str(error);
                if !self.output.is_empty() {
                    result.push_str("\n\n");
                    push_output(&mut result, &self.output);
                }
            }
        }

        result.push_str("\n\nStatus: ");
        result.push_str(&self.command.formatted_status());
        result
    }
}

fn push_command(buf: &mut String, raw: &str) {
    buf.push_str("```bash\n");
    buf.push_str(raw);
    buf.push_str("\n```\n\n");
}

fn push_output(buf: &mut String, output: &str) {
    buf.push_str("### Output\n\n```\n");
    buf.push_str(output);
    buf.push_str("\n```");
}

/// Runs confirmed commands, refusing any the validator rejects
pub struct CommandGate {
    executor: Arc<dyn CommandExecutor>,
    timeout: Option<Duration>,
}

impl CommandGate {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            timeout: None,
        }
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate and run a command. Failures are reported in the result.
    pub async fn execute(&self, mut command: Command) -> CommandResult {
        if !validate_command(&command.raw) {
            tracing::warn!("Blocked command at execution: {}", command.raw);
            command.status = CommandStatus::Blocked;
            command.result = BLOCKED_RESULT.to_string();
            command.exit_code = EXIT_CODE_BLOCKED;
            return CommandResult {
                command,
                output: BLOCKED_OUTPUT.to_string(),
                error: Some(BLOCKED_ERROR.to_string()),
            };
        }

        command.status = CommandStatus::Executing;
        command.executed = true;
        command.timestamp = Some(Utc::now());

        let outcome = match self.timeout {
            Some(timeout) => self.executor.execute_with_timeout(&command.raw, timeout).await,
            None => self.executor.execute(&command.raw).await,
        };

        let process = match outcome {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!("Command could not run: {}", e);
                command.status = CommandStatus::Failed;
                command.exit_code = EXIT_CODE_UNSET;
                command.result = e.to_string();
                return CommandResult {
                    command,
                    output: String::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let mut output = process.combined_output();
        if output.is_empty() && process.success() {
            output = NO_OUTPUT_MESSAGE.to_string();
        }
        let output = truncate_for_display(output);

        tracing::info!(
            "Command finished with exit code {} in {}ms",
            process.exit_code,
            process.execution_time_ms
        );

        command.exit_code = process.exit_code;
        command.result = output.clone();
        let error = if process.success() {
            command.status = CommandStatus::Success;
            None
        } else {
            command.status = CommandStatus::Failed;
            Some(format!("exit status {}", process.exit_code))
        };

        CommandResult {
            command,
            output,
            error,
        }
    }
}

fn truncate_for_display(output: String) -> String {
    match output.char_indices().nth(MAX_DISPLAY_OUTPUT) {
        Some((cut, _)) => format!("{}{}", &output[..cut], TRUNCATION_NOTICE),
        None => output,
    }
}
