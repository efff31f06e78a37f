//! # workerkit-types
//!
//! Shared types for the workerkit job layer.
//!
//! - Settings: layered configuration for naming, dispatch, retry,
//!   reenqueue and shard-health behaviour
//! - JobArgs: the positional argument list every job receives
//!
//! ## Usage
//!
//! ```rust
//! use workerkit_types::Settings;
//!
//! let settings = Settings::default();
//! assert_eq!(settings.dispatch.inline_threshold, 3);
//! ```

pub mod config;
pub mod error;

pub use config::{
    default_namespace_weights, DispatchSettings, NamingSettings, ReenqueueSettings, RetrySettings,
    Settings, ShardHealthSettings,
};
pub use error::TypesError;

/// Positional arguments for one job invocation.
///
/// Arguments travel through the broker as JSON, so each element is a
/// `serde_json::Value`.
pub type JobArgs = Vec<serde_json::Value>;
