//! Command implementations for the workerkit tool.
//!
//! Each command renders its output to a `String` so it can be tested
//! without capturing stdout; the `handle_*` functions print it.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use workerkit_attributes::{parse_definitions, JobTypeBuilder, JobTypeRegistry};
use workerkit_coordination::RetryBackoff;
use workerkit_types::Settings;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Register every definition in `text` and render the result.
pub fn describe_definitions(settings: &Settings, text: &str, json: bool) -> Result<String> {
    let definitions = parse_definitions(text).context("Failed to parse definitions")?;
    let registry = JobTypeRegistry::from_settings(settings);
    let descriptors = registry
        .register_definitions(&definitions)
        .context("Invalid job type definition")?;
    info!(count = descriptors.len(), "Registered job types");

    if json {
        let descriptors: Vec<_> = descriptors.iter().map(|d| d.as_ref()).collect();
        return serde_json::to_string_pretty(&descriptors).context("Failed to encode descriptors");
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<40} {:<36} {:>6} {:<9} {:<7} {:<8} {:<10} {}",
        "TYPE", "QUEUE", "WEIGHT", "URGENCY", "DATA", "BOUNDARY", "IDEMPOTENT", "RETRIES"
    )?;
    for d in &descriptors {
        let retries = match d.max_retries() {
            Some(n) => n.to_string(),
            None => "default".to_string(),
        };
        writeln!(
            out,
            "{:<40} {:<36} {:>6} {:<9} {:<7} {:<8} {:<10} {}",
            d.type_name(),
            d.queue_name(),
            d.weight(),
            d.urgency(),
            d.data_consistency(),
            d.resource_boundary(),
            d.is_idempotent(),
            retries
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Queues: {}", registry.queues().into_iter().collect::<Vec<_>>().join(", "))?;
    Ok(out)
}

/// Render the queue and weight for one type name.
pub fn queue_name_report(settings: &Settings, type_name: &str, namespace: Option<&str>) -> Result<String> {
    let registry = JobTypeRegistry::from_settings(settings);
    let mut builder = JobTypeBuilder::new(type_name);
    if let Some(namespace) = namespace {
        builder = builder.queue_namespace(namespace);
    }
    let descriptor = registry
        .register(builder)
        .with_context(|| format!("Cannot derive a queue for {type_name}"))?;

    Ok(format!(
        "queue:  {}\nweight: {}\n",
        descriptor.queue_name(),
        descriptor.weight()
    ))
}

/// Render `attempts` rows of the retry curve.
pub fn backoff_report(backoff: RetryBackoff, attempts: u32, seed: Option<u64>) -> Result<String> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    debug!(linear_retries = backoff.linear_retries, ?seed, "Rendering backoff curve");

    let mut out = String::new();
    writeln!(out, "{:>7} {:>12} {:>14}  {}", "ATTEMPT", "DELAY_SECS", "TOTAL_SECS", "CURVE")?;
    let mut total: u64 = 0;
    for attempt in 0..attempts {
        let delay = backoff.delay(attempt, &mut rng).as_secs();
        total = total.saturating_add(delay);
        let curve = if attempt < backoff.linear_retries {
            "linear"
        } else {
            "geometric"
        };
        writeln!(out, "{:>7} {:>12} {:>14}  {}", attempt, delay, total, curve)?;
    }
    Ok(out)
}

/// Render the effective settings.
pub fn config_report(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to encode settings")
}

pub fn handle_describe(settings: &Settings, path: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    print!("{}", describe_definitions(settings, &text, json)?);
    Ok(())
}

pub fn handle_queue_name(settings: &Settings, type_name: &str, namespace: Option<&str>) -> Result<()> {
    print!("{}", queue_name_report(settings, type_name, namespace)?);
    Ok(())
}

pub fn handle_backoff(
    settings: &Settings,
    attempts: u32,
    seed: Option<u64>,
    linear_retries: Option<u32>,
) -> Result<()> {
    let backoff = match linear_retries {
        Some(n) => RetryBackoff::new(n),
        None => RetryBackoff::from_settings(&settings.retry),
    };
    print!("{}", backoff_report(backoff, attempts, seed)?);
    Ok(())
}

pub fn handle_config(settings: &Settings) -> Result<()> {
    print!("{}", config_report(settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"
[[job_type]]
name = "App::Projects::ExportWorker"
queue_namespace = "project_export"
urgency = "high"
idempotent = true

[[job_type]]
name = "App::Pipelines::ProcessWorker"
queue_namespace = "pipeline_processing"
"#;

    #[test]
    fn test_describe_table() {
        let out = describe_definitions(&Settings::default(), DEFINITIONS, false).unwrap();
        assert!(out.contains("project_export:projects_export"));
        assert!(out.contains("pipeline_processing:pipelines_process"));
        assert!(out.contains("Queues: pipeline_processing:pipelines_process, project_export:projects_export"));
    }

    #[test]
    fn test_describe_json() {
        let out = describe_definitions(&Settings::default(), DEFINITIONS, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_describe_rejects_bad_value() {
        let result = describe_definitions(
            &Settings::default(),
            "[[job_type]]\nname = \"App::FooWorker\"\nurgency = \"urgent\"\n",
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_queue_name_report() {
        let out = queue_name_report(&Settings::default(), "App::MailerWorker", Some("notifications"))
            .unwrap();
        assert_eq!(out, "queue:  notifications:mailer\nweight: 2\n");

        let out = queue_name_report(&Settings::default(), "App::MailerWorker", None).unwrap();
        assert_eq!(out, "queue:  mailer\nweight: 1\n");
    }

    #[test]
    fn test_backoff_report_seeded() {
        let backoff = RetryBackoff::new(2);
        let first = backoff_report(backoff, 4, Some(9)).unwrap();
        let second = backoff_report(backoff, 4, Some(9)).unwrap();
        assert_eq!(first, second);

        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].ends_with("linear"));
        assert!(lines[3].ends_with("geometric"));
    }

    #[test]
    fn test_config_report() {
        let out = config_report(&Settings::default()).unwrap();
        assert!(out.contains("log_level = \"info\""));
        assert!(out.contains("inline_threshold = 3"));
    }
}
