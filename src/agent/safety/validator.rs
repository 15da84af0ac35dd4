//! Command Validator
//!
//! Deny-list validation of shell commands proposed by the assistant. A command
//! that fails validation is never executed.

use thiserror::Error;

use crate::models::Command;

/// Longest command accepted, in bytes
pub const MAX_COMMAND_LENGTH: usize = 500;

/// System-destroying substrings
const DESTRUCTIVE_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "--no-preserve-root",
    ":(){:",
    ":() {",
    ":(){ :|:",
    "f(){ f|f",
    "perl -e 'fork while 1'",
    "./ --no-preserve-root",
    "dd if=/dev/",
    "> /dev/sda",
    "mkfs",
    "mkfs.",
    "mv /* ",
    "chmod -R 777 /",
    ":(){ :|:& };:",
    "> /dev/hd",
    "shutdown",
    "halt",
    "poweroff",
    "reboot",
];

/// Programs that need a terminal and cannot run headless
const INTERACTIVE_PROGRAMS: &[&str] = &[
    "vim",
    "vi",
    "nano",
    "emacs",
    "pico",
    "top",
    "htop",
    "less",
    "more",
    "man",
    "telnet",
    "ftp",
    "mysql -u",
    "psql -U",
    "ssh",
    "python -i",
    "ipython",
    "redis-cli",
    "mongo",
    "watch",
];

/// Download-and-run prefixes
const PIPE_TO_SHELL_PREFIXES: &[&str] = &[
    "sudo rm -rf",
    "curl | bash",
    "wget | bash",
    "curl | sh",
    "wget | sh",
    "curl -s | bash",
    "wget -O- | bash",
];

const SHELL_INTERPRETERS: &[&str] = &["sh", "bash", "zsh"];

/// Markers of command chaining or injection inside a pipeline stage
const INJECTION_MARKERS: &[&str] = &[
    "$(",
    "`",
    "&&",
    "||",
    ";",
    "&",
    "< /etc/passwd",
    "> /etc/",
    "eval",
];

/// Environment variable names that must not be set from a suggestion (upper-cased match)
const SENSITIVE_ENV_NAMES: &[&str] = &["AWS_", "SECRET_", "PASSWORD", "TOKEN", "KEY", "CREDENTIAL"];

const SENSITIVE_PATHS: &[&str] = &[
    "/etc/shadow",
    "/etc/passwd",
    "/etc/sudoers",
    "/etc/ssh",
    "id_rsa",
    ".ssh/",
    ".aws/",
    "credentials",
    ".env",
];

/// Prefixes that run the rest of the line with elevated privileges
const PRIVILEGE_PREFIXES: &[&str] = &["sudo ", "doas ", "su -c", "pkexec ", "systemctl ", "service "];

const SYSTEM_ADMIN_COMMANDS: &[&str] = &[
    "mount", "umount", "fdisk", "fsck", "mkfs", "chown", "passwd", "ifconfig", "ip addr", "ip link",
    "visudo",
];

/// File-creating commands that must not be followed by running the file
const FILE_CREATION_MARKERS: &[&str] = &["touch ", "echo ", "cat >"];

const FILE_EXECUTION_MARKERS: &[&str] = &["chmod +x", "./", "bash ", "sh "];

/// Why a command was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("command is empty")]
    Empty,

    #[error("command is {0} bytes long (limit 500)")]
    TooLong(usize),

    #[error("matches destructive pattern `{0}`")]
    DestructivePattern(&'static str),

    #[error("`{0}` is interactive and cannot run headless")]
    InteractiveProgram(&'static str),

    #[error("downloads and pipes into a shell (`{0}`)")]
    PipeToShell(&'static str),

    #[error("pipeline stage `{stage}` invokes a shell interpreter")]
    ShellInPipeline { stage: String },

    #[error("pipeline stage `{stage}` contains injection marker `{marker}`")]
    InjectionInPipeline { stage: String, marker: &'static str },

    #[error("sets a sensitive environment variable (`{0}`)")]
    SensitiveEnvironment(&'static str),

    #[error("references sensitive path `{0}`")]
    SensitivePath(&'static str),
}

/// Check a command against every rule, returning the first reason it is refused.
pub fn check_command(raw: &str) -> Result<(), Rejection> {
    if raw.is_empty() {
        return Err(Rejection::Empty);
    }

    if raw.len() > MAX_COMMAND_LENGTH {
        return Err(Rejection::TooLong(raw.len()));
    }

    if let Some(pattern) = DESTRUCTIVE_PATTERNS.iter().copied().find(|p| raw.contains(*p)) {
        return Err(Rejection::DestructivePattern(pattern));
    }

    if let Some(program) = INTERACTIVE_PROGRAMS
        .iter()
        .copied()
        .find(|program| invokes(raw, program))
    {
        return Err(Rejection::InteractiveProgram(program));
    }

    if let Some(prefix) = PIPE_TO_SHELL_PREFIXES.iter().copied().find(|p| raw.starts_with(*p)) {
        return Err(Rejection::PipeToShell(prefix));
    }

    if raw.contains('|') {
        check_pipeline(raw)?;
    }

    if raw.contains("export ") || raw.contains("env ") {
        if raw.contains("PATH=") {
            return Err(Rejection::SensitiveEnvironment("PATH"));
        }

        let upper = raw.to_uppercase();
        if let Some(name) = SENSITIVE_ENV_NAMES.iter().copied().find(|n| upper.contains(*n)) {
            return Err(Rejection::SensitiveEnvironment(name));
        }
    }

    if let Some(path) = SENSITIVE_PATHS.iter().copied().find(|p| raw.contains(*p)) {
        return Err(Rejection::SensitivePath(path));
    }

    Ok(())
}

/// Every stage of a pipeline is checked on its own
fn check_pipeline(raw: &str) -> Result<(), Rejection> {
    for stage in raw.split('|').map(str::trim).filter(|s| !s.is_empty()) {
        let runs_shell = SHELL_INTERPRETERS
            .iter()
            .any(|shell| stage == *shell || stage.contains(&format!("{} ", shell)));
        if runs_shell {
            return Err(Rejection::ShellInPipeline {
                stage: stage.to_string(),
            });
        }

        if let Some(marker) = INJECTION_MARKERS.iter().copied().find(|m| stage.contains(*m)) {
            return Err(Rejection::InjectionInPipeline {
                stage: stage.to_string(),
                marker,
            });
        }
    }

    Ok(())
}

/// `raw` is exactly `program` or `program` followed by arguments
fn invokes(raw: &str, program: &str) -> bool {
    raw == program
        || raw
            .strip_prefix(program)
            .is_some_and(|rest| rest.starts_with(' '))
}

/// Validate a single command. Rejections are logged at debug level.
pub fn validate_command(raw: &str) -> bool {
    match check_command(raw) {
        Ok(()) => true,
        Err(reason) => {
            tracing::debug!("Rejected command {:?}: {}", raw, reason);
            false
        }
    }
}

/// Whether a command runs with elevated privileges or administers the system.
/// Advisory only; used to warn the user before confirmation.
pub fn is_system_command(raw: &str) -> bool {
    PRIVILEGE_PREFIXES.iter().any(|p| raw.starts_with(p))
        || SYSTEM_ADMIN_COMMANDS.iter().any(|cmd| invokes(raw, cmd))
}

/// Validate a batch of commands meant to run in order.
///
/// Besides validating each command, refuses a file-creating command that is
/// directly followed by one that could execute the created file.
pub fn validate_sequence(commands: &[Command]) -> bool {
    if !commands.iter().all(|cmd| validate_command(&cmd.raw)) {
        return false;
    }

    for pair in commands.windows(2) {
        let creates_file = FILE_CREATION_MARKERS.iter().any(|m| pair[0].raw.contains(m));
        let runs_file = FILE_EXECUTION_MARKERS.iter().any(|m| pair[1].raw.contains(m));
        if creates_file && runs_file {
            tracing::debug!(
                "Rejected sequence: {:?} followed by {:?}",
                pair[0].raw,
                pair[1].raw
            );
            return false;
        }
    }

    true
}
