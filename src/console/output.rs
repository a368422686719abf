//! Console output: prompt markers, command output and the diagnostic sink.

use std::io::Write;
use std::sync::Mutex;

/// Marker printed before waiting for a line.
pub const PROMPT_READY: &str = "< ";

/// Marker printed once a line (or a stop signal) arrives.
pub const PROMPT_RECEIVED: &str = "> ";

/// Writers shared by the dispatch loop and command handlers.
///
/// Command output and prompt markers go to `stdout`. Non-fatal dispatch
/// errors are written to `diagnostics` so they are never silently dropped.
/// Write failures are logged and otherwise ignored.
pub struct Output {
    stdout: Mutex<Box<dyn Write + Send>>,
    diagnostics: Mutex<Box<dyn Write + Send>>,
    prompt: bool,
}

// Box<dyn Write> is not Debug, so this is written by hand.
impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl Output {
    /// Creates an output over arbitrary writers, with prompts enabled.
    #[must_use]
    pub fn new(stdout: Box<dyn Write + Send>, diagnostics: Box<dyn Write + Send>) -> Self {
        Self {
            stdout: Mutex::new(stdout),
            diagnostics: Mutex::new(diagnostics),
            prompt: true,
        }
    }

    /// Creates an output writing to the process stdout and stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    /// Enables or disables the prompt markers.
    #[must_use]
    pub const fn with_prompt(mut self, enabled: bool) -> Self {
        self.prompt = enabled;
        self
    }

    /// Prints the ready marker (`< `).
    pub fn prompt_ready(&self) {
        if self.prompt {
            Self::write_to(&self.stdout, PROMPT_READY.as_bytes());
        }
    }

    /// Prints the received marker (`> `).
    pub fn prompt_received(&self) {
        if self.prompt {
            Self::write_to(&self.stdout, PROMPT_RECEIVED.as_bytes());
        }
    }

    /// Prints the received marker on a fresh line, used when the loop stops
    /// without a line (cancellation, read failure).
    pub fn prompt_interrupted(&self) {
        if self.prompt {
            Self::write_to(&self.stdout, format!("\n{PROMPT_RECEIVED}").as_bytes());
        }
    }

    /// Writes `text` to stdout as is.
    pub fn print(&self, text: &str) {
        Self::write_to(&self.stdout, text.as_bytes());
    }

    /// Writes `text` followed by a newline to stdout.
    pub fn println(&self, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        Self::write_to(&self.stdout, line.as_bytes());
    }

    /// Reports a non-fatal error to the diagnostic sink.
    pub fn report(&self, error: &dyn std::error::Error) {
        tracing::debug!(error = %error, "reported console error");
        Self::write_to(&self.diagnostics, format!("error: {error}\n").as_bytes());
    }

    fn write_to(target: &Mutex<Box<dyn Write + Send>>, bytes: &[u8]) {
        if let Ok(mut w) = target.lock() {
            if let Err(e) = w.write_all(bytes).and_then(|()| w.flush()) {
                tracing::debug!(error = %e, "console output write failed");
            }
        }
    }
}
