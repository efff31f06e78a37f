//! Workerkit tool
//!
//! # Usage
//!
//! ```bash
//! workerkit describe jobs.toml [--json]
//! workerkit queue-name App::Projects::ExportWorker [--namespace project_export]
//! workerkit backoff [ATTEMPTS] [--seed N] [--linear-retries N]
//! workerkit config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/workerkit/config.toml)
//! 3. Environment variables (WORKERKIT_*)
//! 4. CLI flags

use anyhow::Result;

use workerkit_cli::{
    handle_backoff, handle_config, handle_describe, handle_queue_name, init_logging, load_settings,
    Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Describe { path, json } => {
            handle_describe(&settings, &path, json)?;
        }
        Commands::QueueName {
            type_name,
            namespace,
        } => {
            handle_queue_name(&settings, &type_name, namespace.as_deref())?;
        }
        Commands::Backoff {
            attempts,
            seed,
            linear_retries,
        } => {
            handle_backoff(&settings, attempts, seed, linear_retries)?;
        }
        Commands::Config => {
            handle_config(&settings)?;
        }
    }

    Ok(())
}
