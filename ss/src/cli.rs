//! CLI argument parsing for slotstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ss")]
#[command(author, version, about = "Shared single-value slot store", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the value of a slot
    Get {
        /// Slot key
        #[arg(required = true)]
        key: String,
    },

    /// Set the value of a slot
    Set {
        /// Slot key
        #[arg(required = true)]
        key: String,

        /// New value
        #[arg(required = true)]
        value: String,
    },

    /// Clear a slot only if it holds the given value
    ClearIf {
        /// Slot key
        #[arg(required = true)]
        key: String,

        /// Value the slot must hold to be cleared
        #[arg(required = true)]
        value: String,
    },

    /// List occupied slots
    List,

    /// Print every change to a slot until interrupted
    Watch {
        /// Slot key
        #[arg(required = true)]
        key: String,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },
}
