//! Configuration loading for workerkit.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/workerkit/config.toml.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TypesError;

/// How queue names are derived from job type names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamingSettings {
    /// Root module prefix stripped from type names (e.g. `App` in `App::Foo::BarWorker`).
    #[serde(default = "default_root_prefix")]
    pub root_prefix: String,

    /// Namespace applied to job types that do not declare their own.
    #[serde(default)]
    pub default_namespace: Option<String>,
}

fn default_root_prefix() -> String {
    "App".to_string()
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            root_prefix: default_root_prefix(),
            default_namespace: None,
        }
    }
}

/// Bulk dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Batches at or below this size run inline instead of through the broker.
    #[serde(default = "default_inline_threshold")]
    pub inline_threshold: usize,

    /// Default time a caller waits for a dispatched batch to signal completion.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,

    /// Maximum number of jobs pushed to the broker in a single call.
    #[serde(default = "default_bulk_push_limit")]
    pub bulk_push_limit: usize,
}

fn default_inline_threshold() -> usize {
    3
}

fn default_wait_timeout() -> u64 {
    10
}

fn default_bulk_push_limit() -> usize {
    1000
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            inline_threshold: default_inline_threshold(),
            wait_timeout_secs: default_wait_timeout(),
            bulk_push_limit: default_bulk_push_limit(),
        }
    }
}

impl DispatchSettings {
    /// Default wait timeout as a `Duration`.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.bulk_push_limit == 0 {
            return Err("dispatch.bulk_push_limit must be > 0".to_string());
        }
        Ok(())
    }
}

/// Retry backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Number of retries that use the linear curve before switching to the geometric one.
    #[serde(default = "default_linear_retries")]
    pub linear_retries: u32,
}

fn default_linear_retries() -> u32 {
    30
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            linear_retries: default_linear_retries(),
        }
    }
}

/// Settings for self-rescheduling jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReenqueueSettings {
    /// Minimum wall-clock duration of one run, in seconds.
    #[serde(default = "default_minimum_duration")]
    pub minimum_duration_secs: u64,
}

fn default_minimum_duration() -> u64 {
    5
}

impl Default for ReenqueueSettings {
    fn default() -> Self {
        Self {
            minimum_duration_secs: default_minimum_duration(),
        }
    }
}

impl ReenqueueSettings {
    /// Minimum run duration as a `Duration`.
    pub fn minimum_duration(&self) -> Duration {
        Duration::from_secs(self.minimum_duration_secs)
    }
}

/// Where the eligible shard set is published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardHealthSettings {
    /// Shared cache key holding the healthy shard names.
    #[serde(default = "default_shard_cache_key")]
    pub cache_key: String,

    /// Lifetime of the published set, in seconds.
    #[serde(default = "default_shard_ttl")]
    pub ttl_secs: u64,
}

fn default_shard_cache_key() -> String {
    "workerkit:healthy_shards".to_string()
}

fn default_shard_ttl() -> u64 {
    600
}

impl Default for ShardHealthSettings {
    fn default() -> Self {
        Self {
            cache_key: default_shard_cache_key(),
            ttl_secs: default_shard_ttl(),
        }
    }
}

impl ShardHealthSettings {
    /// TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Built-in scheduling weights keyed by queue namespace.
pub fn default_namespace_weights() -> HashMap<String, u32> {
    [
        ("auto_devops", 2),
        ("auto_merge", 3),
        ("chaos", 2),
        ("deployment", 3),
        ("mail_scheduler", 2),
        ("notifications", 2),
        ("pipeline_cache", 3),
        ("pipeline_creation", 4),
        ("pipeline_default", 3),
        ("pipeline_hooks", 2),
        ("pipeline_processing", 5),
        ("epics", 2),
        ("incident_management", 2),
        ("security_scans", 2),
    ]
    .into_iter()
    .map(|(namespace, weight)| (namespace.to_string(), weight))
    .collect()
}

fn merge_namespace_weights<'de, D>(deserializer: D) -> Result<HashMap<String, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = HashMap::<String, u32>::deserialize(deserializer)?;
    let mut weights = default_namespace_weights();
    weights.extend(configured);
    Ok(weights)
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Queue naming
    #[serde(default)]
    pub naming: NamingSettings,

    /// Namespace -> weight table used when a job type has no explicit weight.
    /// Configured entries are layered over the built-in table.
    #[serde(
        default = "default_namespace_weights",
        deserialize_with = "merge_namespace_weights"
    )]
    pub namespace_weights: HashMap<String, u32>,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub reenqueue: ReenqueueSettings,

    #[serde(default)]
    pub shard_health: ShardHealthSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            naming: NamingSettings::default(),
            namespace_weights: default_namespace_weights(),
            dispatch: DispatchSettings::default(),
            retry: RetrySettings::default(),
            reenqueue: ReenqueueSettings::default(),
            shard_health: ShardHealthSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/workerkit/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (WORKERKIT_*, `__` separates sections)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "workerkit")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("naming.root_prefix", default_root_prefix())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: WORKERKIT_LOG_LEVEL, WORKERKIT_DISPATCH__INLINE_THRESHOLD, etc.
        builder = builder.add_source(
            Environment::with_prefix("WORKERKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), TypesError> {
        self.dispatch.validate().map_err(TypesError::Config)?;
        if let Some((namespace, _)) = self.namespace_weights.iter().find(|(_, w)| **w == 0) {
            return Err(TypesError::Config(format!(
                "namespace_weights.{namespace} must be > 0"
            )));
        }
        Ok(())
    }

    /// Weight configured for a queue namespace, if any.
    pub fn weight_for_namespace(&self, namespace: &str) -> Option<u32> {
        self.namespace_weights.get(namespace).copied()
    }
}
