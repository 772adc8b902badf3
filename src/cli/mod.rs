//! Command-line interface.
//!
//! Command and argument definitions plus output formatting for the
//! `sharepack` binary.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::{OutputFormatter, VersionRow};
