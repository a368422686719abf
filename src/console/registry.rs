//! Command trait, registry, and exit designation.
//!
//! Commands are registered before the console runs and are read-only while
//! it dispatches, so lookups need no locking.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::help::{HELP_KEY, HELP_TEXT, HelpCommand};
use super::output::Output;
use super::tokenize::is_printable;
use crate::error::{CommandError, ConsoleError, ValidationError};

/// Result returned by command handlers.
pub type CommandResult = Result<(), CommandError>;

/// Everything a handler receives for one invocation.
pub struct Invocation<'a> {
    /// Cancellation token of the running console.
    pub cancel: CancellationToken,
    /// Arguments following the command key. Empty for exit invocations.
    pub args: Vec<String>,
    /// The registry the command was dispatched from.
    pub registry: &'a CommandRegistry,
    /// Console output.
    pub output: &'a Output,
}

/// An executable command handler.
///
/// Implemented automatically for closures of the form
/// `Fn(CancellationToken, Vec<String>) -> impl Future<Output = CommandResult>`.
/// Implement it directly when the handler needs the registry or the output.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command.
    async fn call(&self, invocation: Invocation<'_>) -> CommandResult;
}

#[async_trait::async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(CancellationToken, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CommandResult> + Send + 'static,
{
    async fn call(&self, invocation: Invocation<'_>) -> CommandResult {
        (self)(invocation.cancel, invocation.args).await
    }
}

/// A named command with help text and handler.
#[derive(Clone)]
pub struct Command {
    key: String,
    help: String,
    handler: Option<Arc<dyn CommandHandler>>,
}

impl Command {
    /// Creates a command without a handler.
    ///
    /// A handler must be attached with [`handler`](Self::handler) before
    /// the command can be registered.
    pub fn new(key: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            help: help.into(),
            handler: None,
        }
    }

    /// Attaches the handler.
    #[must_use]
    pub fn handler<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Returns the command key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the help text.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns `true` if both commands share the same handler instance.
    #[must_use]
    pub fn same_handler(&self, other: &Self) -> bool {
        match (&self.handler, &other.handler) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) async fn invoke(&self, invocation: Invocation<'_>) -> CommandResult {
        match &self.handler {
            Some(handler) => handler.call(invocation).await,
            None => Err(CommandError::MissingHandler),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("key", &self.key)
            .field("help", &self.help)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Application metadata rendered by the built-in `help` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpDescriptor {
    /// Application name.
    pub app: String,
    /// One-line description.
    pub description: String,
    /// Version string.
    pub version: String,
}

impl HelpDescriptor {
    /// Creates a descriptor.
    pub fn new(
        app: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            description: description.into(),
            version: version.into(),
        }
    }

    /// Checks that all fields are printable text.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPrintable`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("application name", &self.app),
            ("application description", &self.description),
            ("application version", &self.version),
        ] {
            if !is_printable(value) {
                return Err(ValidationError::NonPrintable { field });
            }
        }
        Ok(())
    }
}

/// Registry of commands keyed by name.
///
/// Also records which command is the designated exit command and the
/// metadata for the built-in `help` command.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
    exit: Option<String>,
    help: Option<HelpDescriptor>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the help descriptor and registers the built-in `help` command.
    ///
    /// Calling it again replaces the descriptor.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a descriptor field is not printable, or
    /// [`ConsoleError::DuplicateKey`] if a user command already owns the
    /// `help` key. Nothing is stored on error.
    pub fn configure_help(&mut self, descriptor: HelpDescriptor) -> Result<(), ConsoleError> {
        descriptor.validate()?;
        if self.help.is_none() {
            self.register(Command::new(HELP_KEY, HELP_TEXT).handler(HelpCommand))?;
        }
        self.help = Some(descriptor);
        Ok(())
    }

    /// Adds a command.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::MissingHandler`] if no handler is attached
    /// - [`ValidationError::Empty`] if the key is empty
    /// - [`ValidationError::NonPrintable`] if the key has non-printable characters
    /// - [`ConsoleError::DuplicateKey`] if the key is taken
    pub fn register(&mut self, command: Command) -> Result<(), ConsoleError> {
        if command.handler.is_none() {
            return Err(ValidationError::MissingHandler { key: command.key }.into());
        }
        if command.key.is_empty() {
            return Err(ValidationError::Empty { field: "key" }.into());
        }
        if !is_printable(&command.key) {
            return Err(ValidationError::NonPrintable { field: "key" }.into());
        }
        if self.commands.contains_key(&command.key) {
            return Err(ConsoleError::DuplicateKey(command.key));
        }
        tracing::debug!(key = %command.key, "registered command");
        self.commands.insert(command.key.clone(), command);
        Ok(())
    }

    /// Marks the command registered under `key` as the exit command.
    ///
    /// A previous designation is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::UnknownCommand`] if `key` is not registered;
    /// the previous designation is kept.
    pub fn designate_exit(&mut self, key: &str) -> Result<(), ConsoleError> {
        self.lookup(key)?;
        if let Some(previous) = self.exit.as_deref().filter(|previous| *previous != key) {
            tracing::debug!(previous, key, "replacing exit command");
        }
        self.exit = Some(key.to_string());
        Ok(())
    }

    /// Returns the command registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::UnknownCommand`] if `key` is not registered.
    pub fn lookup(&self, key: &str) -> Result<&Command, ConsoleError> {
        self.commands
            .get(key)
            .ok_or_else(|| ConsoleError::UnknownCommand(key.to_string()))
    }

    /// Returns the designated exit command.
    #[must_use]
    pub fn exit_command(&self) -> Option<&Command> {
        self.exit.as_deref().and_then(|key| self.commands.get(key))
    }

    /// Returns `true` if `key` is the designated exit command.
    #[must_use]
    pub fn is_exit(&self, key: &str) -> bool {
        self.exit.as_deref() == Some(key)
    }

    /// Returns the help descriptor, if configured.
    #[must_use]
    pub const fn help_descriptor(&self) -> Option<&HelpDescriptor> {
        self.help.as_ref()
    }

    /// Iterates over all commands, ordered by key.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Returns the number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("exit", &self.exit)
            .field("help", &self.help)
            .finish()
    }
}
