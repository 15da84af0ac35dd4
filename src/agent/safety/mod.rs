//! Command Safety Module
//!
//! Validation of assistant-suggested shell commands before they reach the executor.

mod validator;

pub use validator::{
    check_command, is_system_command, validate_command, validate_sequence, Rejection,
    MAX_COMMAND_LENGTH,
};
