//! # neuroproof CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Create a database and the dataset's summary record
//! - `load` - Load a dataset document
//! - `merge` - Apply merge instructions from a file
//! - `status` - Show store version and summary counters
//! - `show` - Show one segment
//! - `history` - Show a segment's merge provenance
//! - `server` - Start the HTTP server

mod commands;

use crate::config::{Overrides, Settings};
use clap::{Parser, Subcommand};
use neuroproof_core::NeuroError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// neuroproof - connectome proofreading merge engine
#[derive(Parser, Debug)]
#[command(name = "neuroproof")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Dataset name
    #[arg(short = 'd', long, global = true)]
    pub dataset: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and the dataset's summary record
    Init {
        /// Reset the dataset thresholds even if the database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Load a dataset document (segments, synapses, sets, connections, skeletons)
    Load {
        /// Path to the JSON document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Apply merge instructions (one object or an array of them)
    Merge {
        /// Path to the JSON instruction file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show store version and summary counters
    Status,

    /// Show one segment
    Show {
        /// Body id
        #[arg(short, long)]
        body: i64,
    },

    /// Show a segment's merge provenance
    History {
        /// Body id
        #[arg(short, long)]
        body: i64,
    },

    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), NeuroError> {
    let (host, port) = match &cli.command {
        Some(Commands::Server { host, port }) => (host.clone(), *port),
        _ => (None, None),
    };
    let settings = Settings::load(
        cli.config.as_deref(),
        Overrides {
            database: cli.database,
            dataset: cli.dataset,
            host,
            port,
        },
    )?;
    if cli.verbose {
        tracing::info!(
            database = %settings.database.display(),
            dataset = %settings.dataset,
            "settings resolved"
        );
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&settings, json_mode, force),
        Some(Commands::Load { file }) => cmd_load(&settings, json_mode, &file),
        Some(Commands::Merge { file }) => cmd_merge(&settings, json_mode, &file),
        Some(Commands::Show { body }) => cmd_show(&settings, json_mode, body),
        Some(Commands::History { body }) => cmd_history(&settings, json_mode, body),
        Some(Commands::Server { .. }) => cmd_server(&settings).await,
        Some(Commands::Status) | None => cmd_status(&settings, json_mode),
    }
}
