//! Printable-text filtering and command line tokenization.

use crate::error::ConsoleError;

/// A tokenized input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// First field: the command key.
    pub name: String,
    /// Remaining fields.
    pub args: Vec<String>,
}

/// Returns `true` for characters that render visibly.
///
/// Control characters, whitespace other than the ASCII space, and invisible
/// format characters (zero-width and bidi controls, BOM) are not printable.
#[must_use]
pub fn is_printable_char(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !(c.is_control()
        || c.is_whitespace()
        || matches!(
            c,
            '\u{00AD}'
                | '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{2069}'
                | '\u{FEFF}'
        ))
}

/// Returns the printable subset of `s`.
#[must_use]
pub fn printable(s: &str) -> String {
    s.chars().filter(|&c| is_printable_char(c)).collect()
}

/// Returns `true` if every character of `s` is printable.
#[must_use]
pub fn is_printable(s: &str) -> bool {
    s.chars().all(is_printable_char)
}

/// Splits a raw input line into command name and arguments.
///
/// Non-printable characters are removed first, then the remainder is split
/// on runs of spaces.
///
/// # Errors
///
/// Returns [`ConsoleError::EmptyLine`] if no field remains.
pub fn split_line(line: &str) -> Result<CommandLine, ConsoleError> {
    let clean = printable(line);
    let mut fields = clean.split_whitespace().map(str::to_owned);
    let name = fields.next().ok_or(ConsoleError::EmptyLine)?;
    Ok(CommandLine {
        name,
        args: fields.collect(),
    })
}
