//! `run`: an interactive console with a small set of demo commands.

use std::time::Duration;

use chrono::TimeDelta;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::ConsoleConfig;
use crate::console::{
    Command, CommandHandler, CommandResult, Console, HelpDescriptor, Invocation, Output,
};
use crate::error::{CommandError, ConsoleError, ValidationError};
use crate::input::{InputRedirect, InputSource};
use crate::observability::init_metrics;

/// Key of the exit command.
pub const QUIT_KEY: &str = "quit";

/// Farewell printed by `quit`.
pub const QUIT_MESSAGE: &str = "Stopping application";

/// Prints each argument on its own line.
#[derive(Debug, Clone, Copy)]
struct Echo;

#[async_trait::async_trait]
impl CommandHandler for Echo {
    async fn call(&self, invocation: Invocation<'_>) -> CommandResult {
        for arg in &invocation.args {
            invocation.output.println(arg);
        }
        Ok(())
    }
}

/// Prints the farewell message.
#[derive(Debug, Clone, Copy)]
struct Quit;

#[async_trait::async_trait]
impl CommandHandler for Quit {
    async fn call(&self, invocation: Invocation<'_>) -> CommandResult {
        invocation.output.println(QUIT_MESSAGE);
        Ok(())
    }
}

/// Waits for the given duration unless the console is cancelled first.
async fn sleep(cancel: CancellationToken, args: Vec<String>) -> CommandResult {
    let [arg] = args.as_slice() else {
        return Err(CommandError::InvalidArguments(
            "expected exactly one duration, e.g. `sleep 500ms`".to_string(),
        ));
    };
    let duration: Duration = humantime::parse_duration(arg)
        .map_err(|e| CommandError::InvalidArguments(format!("{arg}: {e}")))?;

    tokio::select! {
        () = cancel.cancelled() => Err(CommandError::Failed("sleep interrupted".to_string())),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Registers the demo commands and designates `quit` as exit.
///
/// # Errors
///
/// Returns a registration error; none is expected for the built-in set.
pub fn register_commands(console: &mut Console) -> Result<(), ConsoleError> {
    console.configure_help(HelpDescriptor::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    ))?;
    console.register(Command::new("echo", "Print each argument on its own line").handler(Echo))?;
    console.register(Command::new("sleep", "Wait for a duration, e.g. 500ms").handler(sleep))?;
    console.register(Command::new(QUIT_KEY, "Stop the application").handler(Quit))?;
    console.designate_exit(QUIT_KEY)
}

/// Runs the console until `quit`, end of input or cancellation.
///
/// # Errors
///
/// Returns the console's terminal error, or an error setting up metrics or
/// the replayed input.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), ConsoleError> {
    if args.metrics_port.is_some() {
        init_metrics(args.metrics_port)?;
    }

    let config = ConsoleConfig::from_env();
    let output = Output::stdio().with_prompt(!args.no_prompt);
    let mut console =
        Console::new(InputSource::stdin(config.buffer_size), output).with_config(config);
    register_commands(&mut console)?;

    let mut redirect =
        InputRedirect::new(console.input().clone()).with_max_line_size(config.max_line_size);
    if let Some(path) = &args.input {
        let delay = TimeDelta::from_std(args.delay)
            .map_err(|e| ValidationError::DelayOutOfRange(e.to_string()))?;
        redirect.set_delay(delay)?;
        let source = InputSource::open(path).await?;
        info!(input = %path.display(), delay = ?args.delay, "replaying input");
        redirect.substitute(source)?;
    }

    let result = console.run(cancel).await;

    if let Some(e) = redirect.last_error() {
        warn!(error = %e, "input replay failed");
    }
    redirect.restore();
    result
}
