//! Built-in `help` command and usage rendering.

use std::fmt::Write as _;

use super::registry::{CommandHandler, CommandRegistry, CommandResult, Invocation};
use crate::error::CommandError;

/// Key of the built-in help command.
pub const HELP_KEY: &str = "help";

/// Help text of the built-in help command.
pub const HELP_TEXT: &str = "Print usage statement";

const TABLE_HEADER: [&str; 2] = ["command", "usage"];
const COLUMN_GAP: usize = 2;

/// Handler of the built-in `help` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpCommand;

#[async_trait::async_trait]
impl CommandHandler for HelpCommand {
    async fn call(&self, invocation: Invocation<'_>) -> CommandResult {
        if !invocation.args.is_empty() {
            return Err(CommandError::InvalidArguments(format!(
                "{HELP_KEY} takes no arguments, got {}",
                invocation.args.len()
            )));
        }
        invocation.output.print(&render_usage(invocation.registry));
        Ok(())
    }
}

/// Renders the usage statement for `registry`.
#[must_use]
pub fn render_usage(registry: &CommandRegistry) -> String {
    let mut text = String::from("\n");
    if let Some(help) = registry.help_descriptor() {
        let _ = writeln!(text, "{} {}\n", help.app, help.version);
        let _ = writeln!(text, "Description:\n\n  {}\n", help.description);
    }
    text.push_str("Usage:\n\n  command [arguments]\n\n");
    if !registry.is_empty() {
        text.push_str("Available commands:\n");
        let rows: Vec<[&str; 2]> = registry
            .commands()
            .map(|command| [command.key(), command.help()])
            .collect();
        text.push_str(&render_table(TABLE_HEADER, &rows));
    }
    text
}

/// Renders a two-column table without grid lines.
fn render_table(header: [&str; 2], rows: &[[&str; 2]]) -> String {
    let width = rows
        .iter()
        .map(|row| row[0].chars().count())
        .chain(std::iter::once(header[0].chars().count()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for [left, right] in std::iter::once(&header).chain(rows.iter()).copied() {
        let pad = width - left.chars().count() + COLUMN_GAP;
        let _ = writeln!(out, "{left}{:pad$}{right}", "");
    }
    out
}
