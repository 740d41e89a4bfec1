//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solotab - keep one instance of a session active
#[derive(Parser)]
#[command(
    name = "st",
    about = "Single-active-instance coordination over a shared slot",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Store directory (overrides config)
    #[arg(long, global = true, help = "Store directory (overrides config)")]
    pub dir: Option<PathBuf>,

    /// Slot key (overrides config)
    #[arg(short, long, global = true, help = "Slot key (overrides config)")]
    pub key: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an instance until quit, EOF or Ctrl-C
    ///
    /// Reads commands from stdin: force, focus, status, quit.
    Run {
        /// Wait for an occupied slot instead of taking it over
        #[arg(long)]
        no_transfer: bool,

        /// Do not re-evaluate on focus
        #[arg(long)]
        no_reclaim_on_visible: bool,
    },

    /// Show which instance holds the slot
    Status,

    /// Clear a stale claim, only if the slot still holds ID
    Release {
        /// Instance id to release
        id: String,
    },
}
