//! Workerkit tool library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (describe, queue-name, backoff, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    handle_backoff, handle_config, handle_describe, handle_queue_name, init_logging, load_settings,
};
