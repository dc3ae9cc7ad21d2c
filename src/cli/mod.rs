//! CLI layer for docquery.
//!
//! Provides the command-line interface using clap, with commands for
//! document questions, table questions and prompt templates.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
