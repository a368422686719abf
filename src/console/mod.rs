//! The interactive console: registry, line reader and dispatch loop.
//!
//! A [`Console`] owns everything one interactive session needs. Several
//! consoles can coexist; none of them touches process-wide state except
//! through the [`Output`] and [`InputSource`] it was built with.
//!
//! `run` races three events: a reader failure, cancellation and the next
//! line. Lines are dispatched one at a time on the calling task. Every way
//! out of the loop runs the designated exit command. Handlers of one console
//! never overlap, even when `run` or `exit` is driven from several tasks.

pub mod exit;
pub mod help;
pub mod output;
pub mod reader;
pub mod registry;
pub mod tokenize;

pub use help::{HELP_KEY, HELP_TEXT, HelpCommand, render_usage};
pub use output::{Output, PROMPT_READY, PROMPT_RECEIVED};
pub use reader::{LineReader, read_line, read_line_bytes};
pub use registry::{
    Command, CommandHandler, CommandRegistry, CommandResult, HelpDescriptor, Invocation,
};
pub use tokenize::{CommandLine, is_printable, printable, split_line};

use std::ops::ControlFlow;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::input::{InputSlot, InputSource, SharedSource};
use crate::observability::metrics;

/// What woke the dispatch loop.
enum Event {
    Line(String),
    Exhausted,
    Cancelled,
    Failed(std::io::Error),
}

/// An interactive command console.
pub struct Console {
    registry: CommandRegistry,
    input: InputSlot,
    output: Output,
    config: ConsoleConfig,
    // Held for the duration of every handler call.
    handler_lock: Mutex<()>,
}

impl Console {
    /// Creates a console reading from `input` and writing to `output`.
    #[must_use]
    pub fn new(input: InputSource, output: Output) -> Self {
        Self {
            registry: CommandRegistry::new(),
            input: InputSlot::new(input),
            output,
            config: ConsoleConfig::default(),
            handler_lock: Mutex::new(()),
        }
    }

    /// Creates a console on the process standard streams.
    #[must_use]
    pub fn stdio(config: ConsoleConfig) -> Self {
        Self::new(InputSource::stdin(config.buffer_size), Output::stdio()).with_config(config)
    }

    /// Replaces the console configuration.
    #[must_use]
    pub const fn with_config(mut self, config: ConsoleConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the application metadata and registers the built-in `help`.
    ///
    /// # Errors
    ///
    /// See [`CommandRegistry::configure_help`].
    pub fn configure_help(&mut self, descriptor: HelpDescriptor) -> Result<(), ConsoleError> {
        self.registry.configure_help(descriptor)
    }

    /// Registers a command.
    ///
    /// # Errors
    ///
    /// See [`CommandRegistry::register`].
    pub fn register(&mut self, command: Command) -> Result<(), ConsoleError> {
        self.registry.register(command)
    }

    /// Designates the exit command.
    ///
    /// # Errors
    ///
    /// See [`CommandRegistry::designate_exit`].
    pub fn designate_exit(&mut self, key: &str) -> Result<(), ConsoleError> {
        self.registry.designate_exit(key)
    }

    /// Returns the command registry.
    #[must_use]
    pub const fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Returns the input slot. Clone it to redirect input from elsewhere.
    #[must_use]
    pub const fn input(&self) -> &InputSlot {
        &self.input
    }

    /// Installs a new input source and returns the previous one.
    ///
    /// A run already in progress keeps reading its current source.
    pub fn set_input(&self, source: InputSource) -> SharedSource {
        self.input.set(source)
    }

    /// Returns the console output.
    #[must_use]
    pub const fn output(&self) -> &Output {
        &self.output
    }

    /// Returns the console configuration.
    #[must_use]
    pub const fn config(&self) -> ConsoleConfig {
        self.config
    }

    /// Reads and dispatches lines until the console stops.
    ///
    /// The loop stops when:
    ///
    /// - the designated exit command is entered; its result is returned
    /// - `cancel` fires; the exit command runs and its result is returned
    /// - input is exhausted; the exit command runs and
    ///   [`ConsoleError::EmptyInput`] is returned
    /// - reading fails; the exit command runs and
    ///   [`ConsoleError::ReadFailure`] is returned
    ///
    /// Blank lines, unknown commands and failures of other commands are
    /// reported to the diagnostic sink and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns the terminal error described above. An exit command failure
    /// on the exhausted and failed paths is reported rather than returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ConsoleError> {
        let cancel = cancel.child_token();
        // Stops the reader after its current line once the run is over.
        let _stop_reader = cancel.clone().drop_guard();

        let mut reader = LineReader::spawn(&self.input, self.config, cancel.clone());
        info!(commands = self.registry.len(), "console started");
        let result = self.dispatch_lines(&mut reader, &cancel).await;
        if !reader.is_finished() {
            debug!("line reader still waiting on input");
        }
        result
    }

    async fn dispatch_lines(
        &self,
        reader: &mut LineReader,
        cancel: &CancellationToken,
    ) -> Result<(), ConsoleError> {
        let mut failure_open = true;
        loop {
            self.output.prompt_ready();
            match Self::next_event(reader, &mut failure_open, cancel).await {
                Event::Line(line) => {
                    self.output.prompt_received();
                    if let ControlFlow::Break(result) = self.dispatch(&line, cancel).await {
                        info!("console stopped by exit command");
                        return result;
                    }
                }
                Event::Cancelled => {
                    self.output.prompt_interrupted();
                    info!("console cancelled");
                    return self.exit(cancel).await;
                }
                Event::Exhausted => {
                    self.output.prompt_received();
                    info!("console input exhausted");
                    let err = ConsoleError::EmptyInput;
                    metrics::record_dispatch_error(err.kind());
                    self.exit_reporting(cancel).await;
                    return Err(err);
                }
                Event::Failed(e) => {
                    warn!(error = %e, "console input failed");
                    let err = ConsoleError::ReadFailure(e);
                    metrics::record_dispatch_error(err.kind());
                    self.output.prompt_interrupted();
                    self.exit_reporting(cancel).await;
                    return Err(err);
                }
            }
        }
    }

    async fn next_event(
        reader: &mut LineReader,
        failure_open: &mut bool,
        cancel: &CancellationToken,
    ) -> Event {
        loop {
            tokio::select! {
                biased;
                failure = &mut reader.failure, if *failure_open => match failure {
                    Ok(e) => return Event::Failed(e),
                    // Closed without an error; end of input shows up on the line channel.
                    Err(_) => *failure_open = false,
                },
                () = cancel.cancelled() => return Event::Cancelled,
                line = reader.lines.recv() => return line.map_or(Event::Exhausted, Event::Line),
            }
        }
    }

    /// Handles one input line. Breaks with the exit command's result.
    async fn dispatch(
        &self,
        line: &str,
        cancel: &CancellationToken,
    ) -> ControlFlow<Result<(), ConsoleError>> {
        let parsed = match split_line(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report(&e);
                return ControlFlow::Continue(());
            }
        };
        metrics::record_command(metrics::command_label(&self.registry, &parsed.name));

        let command = match self.registry.lookup(&parsed.name) {
            Ok(command) => command,
            Err(e) => {
                self.report(&e);
                return ControlFlow::Continue(());
            }
        };

        debug!(command = command.key(), args = parsed.args.len(), "dispatching");
        let result = self.invoke(command, cancel, parsed.args).await;
        if self.registry.is_exit(command.key()) {
            return ControlFlow::Break(result);
        }
        if let Err(e) = result {
            self.report(&e);
        }
        ControlFlow::Continue(())
    }

    async fn invoke(
        &self,
        command: &Command,
        cancel: &CancellationToken,
        args: Vec<String>,
    ) -> Result<(), ConsoleError> {
        let _serial = self.handler_lock.lock().await;
        let started = Instant::now();
        let result = command
            .invoke(Invocation {
                cancel: cancel.clone(),
                args,
                registry: &self.registry,
                output: &self.output,
            })
            .await;
        metrics::record_command_duration(command.key(), started.elapsed());
        result.map_err(|source| ConsoleError::Command {
            key: command.key().to_string(),
            source,
        })
    }

    fn report(&self, error: &ConsoleError) {
        metrics::record_dispatch_error(error.kind());
        self.output.report(error);
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Clone, Default)]
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl TestWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Records every invocation of a command.
    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<Vec<String>>>>);

    impl Calls {
        fn command(&self, key: &str) -> Command {
            let calls = self.clone();
            Command::new(key, format!("{key} command")).handler(
                move |_: CancellationToken, args: Vec<String>| {
                    let calls = calls.clone();
                    async move {
                        calls.0.lock().unwrap().push(args);
                        CommandResult::Ok(())
                    }
                },
            )
        }

        fn all(&self) -> Vec<Vec<String>> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    struct Harness {
        console: Console,
        stdout: TestWriter,
        diagnostics: TestWriter,
    }

    fn harness(input: InputSource) -> Harness {
        let stdout = TestWriter::default();
        let diagnostics = TestWriter::default();
        let output = Output::new(Box::new(stdout.clone()), Box::new(diagnostics.clone()));
        Harness {
            console: Console::new(input, output),
            stdout,
            diagnostics,
        }
    }

    fn lines(text: &'static str) -> InputSource {
        InputSource::from_reader("test", text.as_bytes())
    }

    #[tokio::test]
    async fn test_dispatch_reports_unknown_and_stops_on_exit() {
        let foo = Calls::default();
        let stop = Calls::default();
        let mut h = harness(lines("foo a b\nbar\nstop\nfoo never\n"));
        h.console.register(foo.command("foo")).unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        h.console.run(CancellationToken::new()).await.unwrap();

        assert_eq!(foo.all(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(stop.all(), vec![Vec::<String>::new()]);
        assert!(h.diagnostics.contents().contains("unknown command 'bar'"));
        assert_eq!(h.stdout.contents(), "< > < > < > ");
    }

    #[tokio::test]
    async fn test_exit_command_error_is_returned() {
        let mut h = harness(lines("stop\n"));
        h.console
            .register(Command::new("stop", "Stop").handler(
                |_: CancellationToken, _: Vec<String>| async {
                    Err(CommandError::Failed("still busy".to_string()))
                },
            ))
            .unwrap();
        h.console.designate_exit("stop").unwrap();

        let err = h.console.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Command { ref key, .. } if key == "stop"));
        assert!(h.diagnostics.contents().is_empty());
    }

    #[tokio::test]
    async fn test_non_exit_error_reported_and_loop_continues() {
        let stop = Calls::default();
        let mut h = harness(lines("fail\nstop\n"));
        h.console
            .register(Command::new("fail", "Always fails").handler(
                |_: CancellationToken, _: Vec<String>| async {
                    Err(CommandError::Failed("boom".to_string()))
                },
            ))
            .unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        h.console.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stop.count(), 1);
        assert!(h.diagnostics.contents().contains("command 'fail' failed: boom"));
    }

    #[tokio::test]
    async fn test_blank_line_reported() {
        let stop = Calls::default();
        let mut h = harness(lines("   \n\u{0007}\nstop\n"));
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        h.console.run(CancellationToken::new()).await.unwrap();
        assert_eq!(h.diagnostics.contents().matches("empty line").count(), 2);
        assert_eq!(stop.count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_runs_exit() {
        let stop = Calls::default();
        let mut h = harness(lines(""));
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        let err = h.console.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::EmptyInput));
        assert_eq!(stop.count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_without_exit() {
        let h = harness(lines("unknown\n"));
        let err = h.console.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::EmptyInput));
        let diagnostics = h.diagnostics.contents();
        assert!(diagnostics.contains("unknown command 'unknown'"));
        assert!(diagnostics.contains("no exit command configured"));
        // The returned error is left to the caller to print.
        assert!(!diagnostics.contains("input exhausted"));
    }

    #[tokio::test]
    async fn test_cancel_during_command_runs_exit_once() {
        let stop = Calls::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut h = harness(lines("cancel\nnext\nnext\n"));
        let next = Calls::default();
        h.console
            .register(Command::new("cancel", "Cancels the run").handler(
                move |_: CancellationToken, _: Vec<String>| {
                    let trigger = trigger.clone();
                    async move {
                        trigger.cancel();
                        CommandResult::Ok(())
                    }
                },
            ))
            .unwrap();
        h.console.register(next.command("next")).unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        h.console.run(cancel).await.unwrap();
        assert_eq!(stop.count(), 1);
        // The line already in flight is dropped.
        assert_eq!(next.count(), 0);
        assert!(h.stdout.contents().ends_with("\n> "));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_on_open_input() {
        let stop = Calls::default();
        let (mut writer, pipe) = tokio::io::duplex(64);
        let mut h = harness(InputSource::from_reader("pipe", pipe));
        let echo = Calls::default();
        h.console.register(echo.command("echo")).unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let run = async { h.console.run(cancel).await };
        let drive = async move {
            writer.write_all(b"echo hi\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
            // Keep the write end open: the reader stays blocked.
            writer
        };
        let (result, _writer) = tokio::join!(run, drive);

        result.unwrap();
        assert_eq!(echo.all(), vec![vec!["hi".to_string()]]);
        assert_eq!(stop.count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_exit_configured() {
        let (_writer, pipe) = tokio::io::duplex(64);
        let h = harness(InputSource::from_reader("pipe", pipe));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = h.console.run(cancel).await.unwrap_err();
        assert!(matches!(err, ConsoleError::NoExitConfigured));
    }

    #[tokio::test]
    async fn test_read_failure_runs_exit() {
        let stop = Calls::default();
        let mock = tokio_test::io::Builder::new()
            .read(b"foo\n")
            .read_error(std::io::Error::other("terminal detached"))
            .build();
        let mut h = harness(InputSource::from_reader("mock", mock));
        let foo = Calls::default();
        h.console.register(foo.command("foo")).unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        let err = h.console.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::ReadFailure(ref e) if e.to_string().contains("terminal detached")));
        assert_eq!(foo.count(), 1);
        assert_eq!(stop.count(), 1);
        assert!(!h.diagnostics.contents().contains("failed to read input"));
    }

    #[tokio::test]
    async fn test_oversized_line_is_read_failure() {
        let stop = Calls::default();
        let mut h = harness(lines("stop-but-far-too-long\n"));
        h.console = h
            .console
            .with_config(ConsoleConfig::default().with_max_line_size(8));
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();

        let err = h.console.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::ReadFailure(ref e) if e.kind() == std::io::ErrorKind::InvalidData));
        assert_eq!(stop.count(), 1);
    }

    #[tokio::test]
    async fn test_help_through_dispatch() {
        let stop = Calls::default();
        let mut h = harness(lines("help\nhelp extra\nstop\n"));
        h.console
            .configure_help(HelpDescriptor::new("Demo", "Demo console", "1.2.3"))
            .unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();
        h.console = Console {
            output: Output::new(
                Box::new(h.stdout.clone()),
                Box::new(h.diagnostics.clone()),
            )
            .with_prompt(false),
            ..h.console
        };

        h.console.run(CancellationToken::new()).await.unwrap();
        assert_eq!(h.stdout.contents(), render_usage(h.console.registry()));
        assert!(h.diagnostics.contents().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn test_set_input_used_by_next_run() {
        let stop = Calls::default();
        let mut h = harness(lines("stop\n"));
        let foo = Calls::default();
        h.console.register(foo.command("foo")).unwrap();
        h.console.register(stop.command("stop")).unwrap();
        h.console.designate_exit("stop").unwrap();
        h.console.run(CancellationToken::new()).await.unwrap();

        let previous = h.console.set_input(lines("foo x\nstop\n"));
        assert!(!h.console.input().is_current(&previous));
        h.console.run(CancellationToken::new()).await.unwrap();
        assert_eq!(foo.all(), vec![vec!["x".to_string()]]);
        assert_eq!(stop.count(), 2);
    }

    #[tokio::test]
    async fn test_independent_consoles() {
        let first_stop = Calls::default();
        let second_stop = Calls::default();
        let mut first = harness(lines("stop\n"));
        let mut second = harness(lines("quit\n"));
        first.console.register(first_stop.command("stop")).unwrap();
        first.console.designate_exit("stop").unwrap();
        second.console.register(second_stop.command("quit")).unwrap();
        second.console.designate_exit("quit").unwrap();

        let (a, b) = tokio::join!(
            first.console.run(CancellationToken::new()),
            second.console.run(CancellationToken::new())
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(first_stop.count(), 1);
        assert_eq!(second_stop.count(), 1);
        assert!(first.console.registry().lookup("quit").is_err());
    }

    #[tokio::test]
    async fn test_handlers_never_overlap_across_runs() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut h = harness(lines(""));
        let (active_in, peak_in) = (Arc::clone(&active), Arc::clone(&peak));
        h.console
            .register(Command::new("stop", "Slow exit").handler(
                move |_: CancellationToken, _: Vec<String>| {
                    let (active, peak) = (Arc::clone(&active_in), Arc::clone(&peak_in));
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        CommandResult::Ok(())
                    }
                },
            ))
            .unwrap();
        h.console.designate_exit("stop").unwrap();

        let (a, b) = tokio::join!(
            h.console.run(CancellationToken::new()),
            h.console.run(CancellationToken::new())
        );
        assert!(matches!(a, Err(ConsoleError::EmptyInput)));
        assert!(matches!(b, Err(ConsoleError::EmptyInput)));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
