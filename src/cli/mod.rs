//! Argument parsing, commands and output helpers for the `netype` binary.

pub mod commands;
pub mod output;
pub mod parser;

pub use parser::{Cli, Commands, OutputFormat};
