//! `promptline` - interactive line console engine
//!
//! Register named commands, then let a [`Console`](console::Console) read
//! lines from its input, dispatch them one at a time and stop cleanly on an
//! exit command, cancellation or input failure.

pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod input;
pub mod observability;
