//! Console runtime configuration.
//!
//! Values are read from environment variables with fallback to defaults.
//! Command-line options of the binary layer on top of these.

use std::str::FromStr;

/// Default maximum length of a single input line in bytes (64 KB).
pub const DEFAULT_MAX_LINE_SIZE: usize = 64 * 1024;

/// Default read buffer size for input sources (8 KB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Default capacity of the in-process pipe used by input redirection (64 KB).
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Configuration for a [`Console`](crate::console::Console).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Maximum line length in bytes; longer lines fail the read.
    pub max_line_size: usize,
    /// Read buffer size for stdin-backed input sources.
    pub buffer_size: usize,
}

impl ConsoleConfig {
    /// Loads configuration from environment variables with defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PROMPTLINE_MAX_LINE_SIZE` | 64 KB |
    /// | `PROMPTLINE_BUFFER_SIZE` | 8 KB |
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_line_size: nonzero_env_or("PROMPTLINE_MAX_LINE_SIZE", DEFAULT_MAX_LINE_SIZE),
            buffer_size: nonzero_env_or("PROMPTLINE_BUFFER_SIZE", DEFAULT_BUFFER_SIZE),
        }
    }

    /// Returns a copy with a different maximum line length.
    #[must_use]
    pub const fn with_max_line_size(mut self, max_line_size: usize) -> Self {
        self.max_line_size = max_line_size;
        self
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Reads an environment variable, parsing it to type `T`, or returns the default.
///
/// Logs a warning if the variable is set but cannot be parsed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(name, value = %v, "invalid env var value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Like [`env_or`], but a zero value also falls back to the default.
fn nonzero_env_or(name: &str, default: usize) -> usize {
    match env_or(name, default) {
        0 => {
            tracing::warn!(name, "zero is not allowed, using default");
            default
        }
        value => value,
    }
}
