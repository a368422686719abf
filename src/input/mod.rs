//! Input sources for the console.
//!
//! An [`InputSource`] is any buffered async reader with a label for logging.
//! The console reads from whatever source its [`InputSlot`] currently holds;
//! the slot can be swapped at runtime, which is how input is redirected in
//! tests (see [`redirect`]).

pub mod redirect;

pub use redirect::InputRedirect;

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::io::{AsyncBufRead, AsyncRead, BufReader};
use tokio::sync::Mutex;

/// An input source shared between the slot and a running line reader.
///
/// The async mutex is held by the reader task for as long as it reads, so
/// two readers never interleave on one source.
pub type SharedSource = Arc<Mutex<InputSource>>;

/// A labelled, buffered stream of input lines.
pub struct InputSource {
    label: String,
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl InputSource {
    /// Wraps the process standard input.
    #[must_use]
    pub fn stdin(buffer_size: usize) -> Self {
        Self::from_buf_reader(
            "stdin",
            BufReader::with_capacity(buffer_size, tokio::io::stdin()),
        )
    }

    /// Wraps an unbuffered reader.
    pub fn from_reader<R>(label: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::from_buf_reader(label, BufReader::new(reader))
    }

    /// Wraps an already buffered reader.
    pub fn from_buf_reader<R>(label: impl Into<String>, reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            label: label.into(),
            reader: Box::new(reader),
        }
    }

    /// Opens a file as an input source.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(path.display().to_string(), file))
    }

    /// Returns the label used in log output.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn reader_mut(&mut self) -> &mut (dyn AsyncBufRead + Send + Unpin) {
        self.reader.as_mut()
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSource")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Replaceable handle to the console's active input source.
///
/// Clones share the same slot. Replacing the source never waits for a line
/// reader that is still running: the reader keeps the source it captured
/// when it started, and observes the new one only on the next run.
#[derive(Clone)]
pub struct InputSlot {
    current: Arc<StdMutex<SharedSource>>,
}

impl InputSlot {
    /// Creates a slot holding `source`.
    #[must_use]
    pub fn new(source: InputSource) -> Self {
        Self {
            current: Arc::new(StdMutex::new(Arc::new(Mutex::new(source)))),
        }
    }

    /// Returns the currently active source.
    #[must_use]
    pub fn current(&self) -> SharedSource {
        Arc::clone(&self.lock())
    }

    /// Installs `source` and returns the previous one.
    pub fn set(&self, source: InputSource) -> SharedSource {
        self.replace(Arc::new(Mutex::new(source)))
    }

    /// Installs an already shared source and returns the previous one.
    pub fn replace(&self, source: SharedSource) -> SharedSource {
        std::mem::replace(&mut *self.lock(), source)
    }

    /// Returns `true` if `source` is the active source (pointer identity).
    #[must_use]
    pub fn is_current(&self, source: &SharedSource) -> bool {
        Arc::ptr_eq(&self.lock(), source)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedSource> {
        // The guarded value is a plain pointer swap; a poisoned lock still holds a valid Arc.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSlot").finish_non_exhaustive()
    }
}
