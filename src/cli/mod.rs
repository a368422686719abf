//! Command-line interface of the `promptline` binary.

pub mod args;
pub mod commands;
