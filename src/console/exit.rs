//! Exit coordination shared by every termination path.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Console;
use crate::error::ConsoleError;

impl Console {
    /// Runs the designated exit command with no arguments.
    ///
    /// Used by `run` whenever it stops, so cleanup and farewell output are
    /// the same regardless of why the console stopped. May also be called
    /// directly.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::NoExitConfigured`] if no exit command was
    /// designated, or [`ConsoleError::Command`] if the exit command failed.
    pub async fn exit(&self, cancel: &CancellationToken) -> Result<(), ConsoleError> {
        let command = self
            .registry
            .exit_command()
            .ok_or(ConsoleError::NoExitConfigured)?;
        info!(command = command.key(), "running exit command");
        self.invoke(command, cancel, Vec::new()).await
    }

    /// Runs the exit command on a path whose return value is already decided;
    /// its error goes to the diagnostic sink.
    pub(super) async fn exit_reporting(&self, cancel: &CancellationToken) {
        if let Err(e) = self.exit(cancel).await {
            self.report(&e);
        }
    }
}
