//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sharepack - declarative share-pack provisioning for the data sharing platform.
#[derive(Parser, Debug)]
#[command(name = "sharepack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the share-pack document.
    #[arg(short, long, global = true, env = "SHAREPACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the version stores.
    #[arg(long, global = true, env = "SHAREPACK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the share-pack document.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Execute the pack against the platform.
    Apply {
        /// Skip the confirmation prompt for DELETE packs.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the live resources on record.
    Status {
        /// Include superseded and deleted versions.
        #[arg(short, long)]
        all: bool,
    },

    /// Show the version history of one resource.
    History {
        /// Resource name.
        name: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
