//! Data Models
//!
//! Conversation messages, extracted shell commands and the crate error type.

pub mod command;
pub mod error;
pub mod message;

pub use command::{Command, CommandStatus, EXIT_CODE_BLOCKED, EXIT_CODE_UNSET};
pub use error::{AgentError, Result};
pub use message::{AgentMode, ChatChunk, Message, MessageRole};
