//! Shared integration-test harness for spawning the `promptline` binary and
//! talking to its console over stdio.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Default timeout for reading a single line from the console.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running `promptline run` process.
///
/// Prompts are disabled so stdout carries only command output. The child
/// process is killed on drop via `kill_on_drop(true)`.
#[allow(clippy::missing_panics_doc)]
pub struct PromptlineProcess {
    child: Child,
    stdin: Option<tokio::process::ChildStdin>,
    reader: BufReader<tokio::process::ChildStdout>,
}

impl PromptlineProcess {
    /// Spawns `promptline run --no-prompt` with extra arguments.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn(extra_args: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_promptline"))
            .args(["--quiet", "run", "--no-prompt"])
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn promptline");

        let stdin = child.stdin.take().expect("stdin not captured");
        let stdout = child.stdout.take().expect("stdout not captured");

        Self {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
        }
    }

    /// Writes one line to the console.
    #[allow(clippy::missing_panics_doc)]
    pub async fn send_line(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write to stdin");
        stdin.flush().await.expect("failed to flush stdin");
    }

    /// Reads one line of console output, without the terminator.
    ///
    /// Panics on EOF or if nothing arrives within `DEFAULT_TIMEOUT`.
    #[allow(clippy::missing_panics_doc)]
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = tokio::time::timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for console output")
            .expect("read_line I/O error");
        assert!(n > 0, "unexpected EOF from console");
        line.trim_end_matches('\n').to_string()
    }

    /// Sends a signal (e.g. `"TERM"`) to the process via `kill`.
    #[allow(clippy::missing_panics_doc)]
    pub fn signal(&self, name: &str) {
        let pid = self.child.id().expect("process already exited");
        let status = std::process::Command::new("kill")
            .arg(format!("-{name}"))
            .arg(pid.to_string())
            .status()
            .expect("failed to run kill");
        assert!(status.success(), "kill -{name} {pid} failed");
    }

    /// Closes stdin so the console sees end of input.
    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    /// Waits for the process to exit and returns its exit code.
    #[allow(clippy::missing_panics_doc)]
    pub async fn wait(mut self) -> Option<i32> {
        let status = tokio::time::timeout(DEFAULT_TIMEOUT, self.child.wait())
            .await
            .expect("timed out waiting for exit")
            .expect("failed to wait for child");
        status.code()
    }

    /// Runs the binary to completion with `input` on stdin.
    #[allow(clippy::missing_panics_doc)]
    pub fn run_with_stdin(args: &[&str], input: &str) -> Output {
        let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_promptline"))
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn promptline");
        child
            .stdin
            .take()
            .expect("stdin not captured")
            .write_all(input.as_bytes())
            .expect("failed to write stdin");
        child.wait_with_output().expect("failed to wait for child")
    }

    /// Runs the binary to completion with no stdin.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn_command(args: &[&str]) -> Output {
        std::process::Command::new(env!("CARGO_BIN_EXE_promptline"))
            .args(args)
            .stdin(Stdio::null())
            .output()
            .expect("failed to run promptline")
    }

    /// Returns the path to a test fixture.
    #[must_use]
    pub fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }
}
