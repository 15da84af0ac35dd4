//! Shell Command Model
//!
//! A command extracted from an assistant reply and its execution lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::safety::is_system_command;

/// Exit code of a command that has not run yet
pub const EXIT_CODE_UNSET: i32 = -1;

/// Exit code of a command refused by the validator at execution time
pub const EXIT_CODE_BLOCKED: i32 = -2;

/// Lifecycle status of a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    #[default]
    Pending,
    Executing,
    Success,
    Failed,
    Blocked,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::Pending => write!(f, "pending"),
            CommandStatus::Executing => write!(f, "executing"),
            CommandStatus::Success => write!(f, "success"),
            CommandStatus::Failed => write!(f, "failed"),
            CommandStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// A shell command that can be offered to the user for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub raw: String,
    /// Text preceding the command in the reply, if any
    pub description: Option<String>,
    pub executed: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: CommandStatus,
    pub result: String,
    pub exit_code: i32,
}

impl Command {
    /// Create a pending command
    pub fn new(raw: impl Into<String>, description: Option<String>) -> Self {
        Self {
            raw: raw.into(),
            description: description.filter(|d| !d.is_empty()),
            executed: false,
            timestamp: None,
            status: CommandStatus::Pending,
            result: String::new(),
            exit_code: EXIT_CODE_UNSET,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == CommandStatus::Blocked
    }

    pub fn is_successful(&self) -> bool {
        self.status == CommandStatus::Success && self.exit_code == 0
    }

    pub fn is_pending(&self) -> bool {
        self.status == CommandStatus::Pending || !self.executed
    }

    pub fn is_executing(&self) -> bool {
        self.status == CommandStatus::Executing
    }

    pub fn is_failed(&self) -> bool {
        self.status == CommandStatus::Failed || (self.executed && self.exit_code != 0)
    }

    /// User-facing status line
    pub fn formatted_status(&self) -> String {
        match self.status {
            CommandStatus::Pending => "Pending".to_string(),
            CommandStatus::Executing => "Executing...".to_string(),
            CommandStatus::Success if self.exit_code == 0 => "Succeeded".to_string(),
            CommandStatus::Success => format!("Completed with exit code {}", self.exit_code),
            CommandStatus::Failed => format!("Failed (exit code: {})", self.exit_code),
            CommandStatus::Blocked => "Blocked for security reasons".to_string(),
        }
    }

    /// Description cut to 50 characters for compact display
    pub fn short_description(&self) -> String {
        let desc = self.description.as_deref().unwrap_or_default();
        if desc.chars().count() > 50 {
            let head: String = desc.chars().take(47).collect();
            format!("{}...", head)
        } else {
            desc.to_string()
        }
    }

    /// Markdown preview shown when asking the user to confirm execution
    pub fn preview(&self) -> String {
        let mut preview = format!("```bash\n{}\n```", self.raw);

        if is_system_command(&self.raw) {
            preview.push_str(
                "\n\n**Warning**: This is a system-level command that may require elevated privileges.",
            );
        }

        if let Some(description) = &self.description {
            preview.push_str("\n\n**Context**: ");
            preview.push_str(description);
        }

        preview
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", description, self.raw),
            None => write!(f, "{}", self.raw),
        }
    }
}
