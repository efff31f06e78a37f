//! CLI argument parsing for the workerkit tool.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Workerkit job layer tooling
///
/// Inspect job type definitions, queue routing and retry curves.
#[derive(Parser, Debug)]
#[command(name = "workerkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/workerkit/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Tool commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a job type definitions file and print each type
    Describe {
        /// TOML file of [[job_type]] tables
        path: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the queue and weight a job type routes to
    QueueName {
        /// Fully qualified type name, e.g. App::Projects::ExportWorker
        type_name: String,

        /// Queue namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Print the retry delay curve
    Backoff {
        /// Number of attempts to print
        #[arg(default_value = "35")]
        attempts: u32,

        /// Seed for a reproducible curve
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override the number of linear retries
        #[arg(long)]
        linear_retries: Option<u32>,
    },

    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
