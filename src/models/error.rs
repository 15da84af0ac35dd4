use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Session is busy with another query")]
    SessionBusy,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Command execution failed: {command} (exit code: {exit_code})\nStderr: {stderr}")]
    CommandExecutionFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Check if this error can be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Timeout(_) | AgentError::RateLimited(_) | AgentError::Provider(_)
        )
    }

    /// Get a suggestion for recovering from this error
    pub fn recovery_suggestion(&self) -> &str {
        match self {
            AgentError::Provider(_) => "Check network connectivity and try again",
            AgentError::Authentication(_) => "Verify your API key",
            AgentError::RateLimited(_) => "Wait a moment before sending another query",
            AgentError::Cancelled => "Ask again when ready",
            AgentError::SessionBusy => "Wait for the current answer to finish",
            AgentError::InvalidConfiguration(_) => "Review your provider settings",
            AgentError::ParseError(_) => "Try the query again",
            AgentError::CommandExecutionFailed { .. } => "Check the command and its output",
            AgentError::Timeout(_) => "Retry with a longer timeout",
            AgentError::Internal(_) => "Restart the application and try again",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
