//! Input redirection through an in-process pipe.
//!
//! [`InputRedirect`] replaces the source held by an [`InputSlot`] with the
//! read end of a pipe, and spawns a relay task that copies another source
//! into the pipe line by line, optionally sleeping between lines. This makes
//! console sessions scriptable and rate limited, which keeps tests
//! deterministic without touching the process standard input.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::TimeDelta;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{InputSlot, InputSource, SharedSource};
use crate::config::{DEFAULT_MAX_LINE_SIZE, DEFAULT_PIPE_CAPACITY};
use crate::console::read_line_bytes;
use crate::error::{ConsoleError, ValidationError};

type ErrorCell = Arc<StdMutex<Option<Arc<std::io::Error>>>>;

/// Redirects a console's input to a replayed source.
///
/// The first [`substitute`](Self::substitute) captures the source the slot
/// held at that moment; every [`restore`](Self::restore) reinstates exactly
/// that source, no matter how many substitute/restore cycles happened in
/// between. Substitute and restore take `&mut self`, so calls on one
/// redirect are always serialized.
///
/// Dropping the redirect restores the original source.
pub struct InputRedirect {
    slot: InputSlot,
    original: Option<SharedSource>,
    read_end: Option<SharedSource>,
    relay: Option<JoinHandle<()>>,
    delay: Duration,
    pipe_capacity: usize,
    max_line_size: usize,
    last_error: ErrorCell,
}

impl InputRedirect {
    /// Creates a redirect for `slot`. Nothing changes until
    /// [`substitute`](Self::substitute) is called.
    #[must_use]
    pub fn new(slot: InputSlot) -> Self {
        Self {
            slot,
            original: None,
            read_end: None,
            relay: None,
            delay: Duration::ZERO,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            last_error: Arc::new(StdMutex::new(None)),
        }
    }

    /// Limits the length of a relayed line; a longer line stops the relay
    /// and is recorded as [`last_error`](Self::last_error).
    #[must_use]
    pub const fn with_max_line_size(mut self, max_line_size: usize) -> Self {
        self.max_line_size = max_line_size;
        self
    }

    /// Sets the pause between relayed lines for subsequent substitutions.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NegativeDelay`] for a negative delay; the
    /// previously configured delay is kept.
    pub fn set_delay(&mut self, delay: TimeDelta) -> Result<(), ConsoleError> {
        if delay < TimeDelta::zero() {
            return Err(ValidationError::NegativeDelay(delay).into());
        }
        self.delay = delay
            .to_std()
            .map_err(|e| ValidationError::DelayOutOfRange(e.to_string()))?;
        Ok(())
    }

    /// Returns the configured pause between relayed lines.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns `true` while a substitution is installed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.read_end.is_some()
    }

    /// Returns the last error recorded by the relay task, if any.
    ///
    /// Cleared at the start of every substitution.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<std::io::Error>> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the slot's source with a pipe fed from `source`.
    ///
    /// Any previous substitution is restored first. The relay task writes
    /// each line of `source` followed by `\n` into the pipe, sleeping for the
    /// configured delay between lines, and closes the pipe when `source` is
    /// exhausted, so readers of the slot then observe end of input. Line
    /// contents are copied byte for byte; only the terminator becomes `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::PipeUnavailable`] when called outside a tokio
    /// runtime (the relay cannot be driven); the original source is then
    /// left in place.
    pub fn substitute(&mut self, source: InputSource) -> Result<(), ConsoleError> {
        self.restore();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.restore();
                return Err(ConsoleError::PipeUnavailable(e.to_string()));
            }
        };

        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;

        let (pipe_reader, pipe_writer) = tokio::io::duplex(self.pipe_capacity);
        let read_end: SharedSource = Arc::new(Mutex::new(InputSource::from_reader(
            format!("redirect({})", source.label()),
            pipe_reader,
        )));

        debug!(
            source = source.label(),
            delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            "substituting console input"
        );

        let previous = self.slot.replace(Arc::clone(&read_end));
        if self.original.is_none() {
            self.original = Some(previous);
        }
        self.read_end = Some(read_end);
        self.relay = Some(runtime.spawn(relay_lines(
            source,
            pipe_writer,
            self.delay,
            self.max_line_size,
            Arc::clone(&self.last_error),
        )));
        Ok(())
    }

    /// Tears down the current substitution and reinstates the original source.
    ///
    /// Releases the pipe's read end, stops the relay (closing the write end
    /// and the replayed source), then puts the original source back into the
    /// slot. Idempotent; a no-op before the first substitution.
    pub fn restore(&mut self) {
        let was_active = self.read_end.take().is_some();
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
        if let Some(original) = &self.original {
            self.slot.replace(Arc::clone(original));
        }
        if was_active {
            debug!("console input restored");
        }
    }
}

impl Drop for InputRedirect {
    fn drop(&mut self) {
        self.restore();
    }
}

impl std::fmt::Debug for InputRedirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputRedirect")
            .field("active", &self.is_active())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Copies `source` into `pipe` line by line.
async fn relay_lines(
    mut source: InputSource,
    mut pipe: DuplexStream,
    delay: Duration,
    max_line_size: usize,
    last_error: ErrorCell,
) {
    let record = |e: std::io::Error| {
        *last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(e));
    };

    let mut relayed = 0_u64;
    loop {
        match read_line_bytes(source.reader_mut(), max_line_size).await {
            Ok(Some(mut framed)) => {
                framed.push(b'\n');
                if let Err(e) = pipe.write_all(&framed).await {
                    // The reading side went away (restore or a dropped console).
                    if e.kind() == std::io::ErrorKind::BrokenPipe {
                        debug!(relayed, "redirect pipe closed by reader");
                    } else {
                        warn!(error = %e, "failed to relay input line");
                        record(e);
                    }
                    return;
                }
                relayed += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read redirected source");
                record(e);
                break;
            }
        }
    }

    debug!(relayed, "redirected source exhausted");
    if let Err(e) = pipe.shutdown().await {
        debug!(error = %e, "failed to close redirect pipe");
    }
}
