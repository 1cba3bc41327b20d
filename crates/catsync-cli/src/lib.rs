//! catsync Library
//!
//! Incremental enrichment of a product catalog table.
//!
//! # Overview
//!
//! Each run reads the catalog once, picks up where the previous run stopped,
//! looks the selected products up in batches against the product API, writes
//! the enriched fields back into each product's row, and records the last
//! written row as the checkpoint for the next run.
//!
//! - **Enrichment runs**: `catsync run`
//! - **Checkpoint inspection**: `catsync status`
//! - **Starting over**: `catsync reset`
//! - **Configuration**: `catsync config show`

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod batch;
pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod selector;
pub mod table;
pub mod writer;

// Re-export commonly used types
pub use config::SyncConfig;
pub use error::{ErrorKind, Result, SyncError};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport, RunSettings, RunState};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// catsync - incremental catalog enrichment
#[derive(Parser, Debug)]
#[command(name = "catsync")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./catsync.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enrich the next slice of the catalog
    Run {
        /// Records to process in this run
        #[arg(short = 'n', long)]
        max_records: Option<usize>,

        /// Records per API request
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Show the checkpoint and run lease
    Status,

    /// Clear the checkpoint
    Reset {
        /// Also remove a lease held by another run
        #[arg(short, long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}
