//! AI Agent Module
//!
//! This module provides the chat agent for the terminal with support for:
//! - Streaming conversations with any configured model provider
//! - Extraction of shell commands from assistant replies
//! - Deny-list safety checks before anything is executed
//! - Gated execution of confirmed commands

pub mod extractor;
pub mod gate;
pub mod safety;
pub mod session;

// Re-export commonly used types
pub use extractor::extract_commands;
pub use gate::{CommandGate, CommandResult};
pub use safety::{is_system_command, validate_command, validate_sequence, Rejection};
pub use session::{AgentSession, AskStream};
