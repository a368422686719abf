//! Error types for `promptline`
//!
//! Registration, dispatch and input errors share one top-level enum so the
//! console loop and the embedding binary can report and map them uniformly.

use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for the `promptline` binary.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error (command failure, no exit command configured)
    pub const ERROR: i32 = 1;

    /// Validation error (invalid command key, help text or delay)
    pub const VALIDATION_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Input error (input exhausted, read failure, pipe unavailable)
    pub const INPUT_ERROR: i32 = 4;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for console operations.
///
/// Registration errors are returned synchronously and never leave partial
/// state behind. Dispatch errors are either reported to the diagnostic sink
/// (the loop continues) or returned from [`Console::run`] as its terminal
/// value.
///
/// [`Console::run`]: crate::console::Console::run
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Invalid command, help descriptor or delay
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A command with the same key is already registered
    #[error("duplicate command key '{0}'")]
    DuplicateKey(String),

    /// No command is registered under the key
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The input line contained no command
    #[error("empty line")]
    EmptyLine,

    /// The input source was exhausted before the exit command ran
    #[error("input exhausted without an exit command")]
    EmptyInput,

    /// An exit was requested but no command is designated as exit
    #[error("no exit command configured")]
    NoExitConfigured,

    /// The replacement input pipe could not be set up
    #[error("input pipe unavailable: {0}")]
    PipeUnavailable(String),

    /// Reading from the input source failed
    #[error("failed to read input: {0}")]
    ReadFailure(#[source] std::io::Error),

    /// A command handler returned an error
    #[error("command '{key}' failed: {source}")]
    Command {
        /// Key of the failed command
        key: String,
        /// Error returned by the handler
        #[source]
        source: CommandError,
    },

    /// I/O error outside of line reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::DuplicateKey(_) => ExitCode::VALIDATION_ERROR,
            Self::EmptyInput | Self::ReadFailure(_) | Self::PipeUnavailable(_) => {
                ExitCode::INPUT_ERROR
            }
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::UnknownCommand(_)
            | Self::EmptyLine
            | Self::NoExitConfigured
            | Self::Command { .. } => ExitCode::ERROR,
        }
    }

    /// Short, stable name of the error kind, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::UnknownCommand(_) => "unknown_command",
            Self::EmptyLine => "empty_line",
            Self::EmptyInput => "empty_input",
            Self::NoExitConfigured => "no_exit_configured",
            Self::PipeUnavailable(_) => "pipe_unavailable",
            Self::ReadFailure(_) => "read_failure",
            Self::Command { .. } => "command",
            Self::Io(_) => "io",
        }
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation failures at registration or configuration time.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Command was registered without a handler
    #[error("command '{key}' has no handler")]
    MissingHandler {
        /// Key of the command
        key: String,
    },

    /// A required text field is empty
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the field
        field: &'static str,
    },

    /// A text field contains control or other non-printable characters
    #[error("{field} contains non-printable characters")]
    NonPrintable {
        /// Name of the field
        field: &'static str,
    },

    /// Replay delay is negative
    #[error("delay must not be negative, got {0}")]
    NegativeDelay(chrono::TimeDelta),

    /// Replay delay cannot be represented
    #[error("delay out of range: {0}")]
    DelayOutOfRange(String),
}

// ============================================================================
// Command Errors
// ============================================================================

/// Errors returned by command handlers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command was invoked with unusable arguments
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The command failed
    #[error("{0}")]
    Failed(String),

    /// I/O error inside the handler
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The command has no handler attached
    #[error("no handler attached")]
    MissingHandler,
}

// ============================================================================
// Tests
// ============================================================================
