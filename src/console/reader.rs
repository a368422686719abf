//! Background line reader.
//!
//! The reader task pulls lines from the console's current input source and
//! hands them to the dispatch loop over a channel with a single slot. It
//! reserves that slot before reading, so at most one line is read ahead of
//! the dispatcher and lines arrive in source order.
//!
//! Cancellation is cooperative: the token is checked after every line, but a
//! read that is blocked on an open-ended source is not interrupted. Such a
//! task lingers until the source yields or closes; it keeps the source it
//! captured, so replacing the console input never waits for it.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::ConsoleConfig;
use crate::input::{InputSlot, SharedSource};
use crate::observability::metrics;

/// Reads one `\n` terminated line, at most `max_line_size` bytes long.
///
/// A trailing `\r` is stripped and invalid UTF-8 is replaced. A final line
/// without terminator is still returned. Returns `Ok(None)` at end of input.
///
/// # Errors
///
/// Returns the underlying I/O error, or [`io::ErrorKind::InvalidData`] if
/// the line is longer than `max_line_size`.
pub async fn read_line<R>(reader: &mut R, max_line_size: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    Ok(read_line_bytes(reader, max_line_size)
        .await?
        .map(|buf| String::from_utf8_lossy(&buf).into_owned()))
}

/// Like [`read_line`], but returns the line's raw bytes.
///
/// # Errors
///
/// Same as [`read_line`].
pub async fn read_line_bytes<R>(reader: &mut R, max_line_size: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = newline.map_or(available, |pos| &available[..pos]);
        if buf.len() + chunk.len() > max_line_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {max_line_size} bytes"),
            ));
        }
        buf.extend_from_slice(chunk);

        let consumed = newline.map_or(available.len(), |pos| pos + 1);
        reader.consume(consumed);
        if newline.is_some() {
            break;
        }
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Receiving side of a running reader task.
///
/// `lines` closes once the source is exhausted or failed. `failure` delivers
/// at most one terminal read error and closes when the task ends.
#[derive(Debug)]
pub struct LineReader {
    /// Lines in source order.
    pub lines: mpsc::Receiver<String>,
    /// Terminal read error.
    pub failure: oneshot::Receiver<io::Error>,
    handle: JoinHandle<()>,
}

impl LineReader {
    /// Spawns a reader over the source currently held by `input`.
    #[must_use]
    pub fn spawn(input: &InputSlot, config: ConsoleConfig, cancel: CancellationToken) -> Self {
        let (line_tx, lines) = mpsc::channel(1);
        let (failure_tx, failure) = oneshot::channel();
        let handle = tokio::spawn(read_lines(
            input.current(),
            line_tx,
            failure_tx,
            config.max_line_size,
            cancel,
        ));
        Self {
            lines,
            failure,
            handle,
        }
    }

    /// Returns `true` once the reader task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[allow(clippy::significant_drop_tightening)] // source must stay locked while reading
async fn read_lines(
    source: SharedSource,
    lines: mpsc::Sender<String>,
    failure: oneshot::Sender<io::Error>,
    max_line_size: usize,
    cancel: CancellationToken,
) {
    let mut source = tokio::select! {
        guard = source.lock_owned() => guard,
        () = cancel.cancelled() => {
            debug!("line reader cancelled before acquiring input");
            return;
        }
    };
    debug!(source = source.label(), "line reader started");

    loop {
        // Dispatcher gone: nobody will read further lines.
        let Ok(permit) = lines.reserve().await else {
            break;
        };

        match read_line(source.reader_mut(), max_line_size).await {
            Ok(Some(line)) => {
                trace!(len = line.len(), "line read");
                metrics::record_line();
                permit.send(line);
            }
            Ok(None) => {
                debug!(source = source.label(), "input exhausted");
                break;
            }
            Err(e) => {
                warn!(source = source.label(), error = %e, "input read failed");
                // The receiver may already be gone if the console stopped.
                let _ = failure.send(e);
                return;
            }
        }

        if cancel.is_cancelled() {
            debug!("line reader stopped by cancellation");
            break;
        }
    }
}
