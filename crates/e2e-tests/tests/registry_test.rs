//! Job type registry E2E tests.
//!
//! Covers loading definitions and settings from files the way a worker
//! process does at boot.

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

use workerkit_adapters::StaticFeatureFlags;
use workerkit_attributes::{
    parse_definitions, AttributeError, DataConsistency, JobTypeBuilder, JobTypeRegistry,
};
use workerkit_types::Settings;

const DEFINITIONS: &str = r#"
[[job_type]]
name = "Gitlab::Import::StageWorker"
queue_namespace = "importers"
tags = ["import"]

[[job_type]]
name = "Gitlab::Import::AdvanceStageWorker"
parent = "Gitlab::Import::StageWorker"
data_consistency = "sticky"
data_consistency_feature_flag = "load_balancing_for_import"

[[job_type]]
name = "Gitlab::Projects::ExportWorker"
queue_namespace = "project_export"
weight = 4
idempotent = true

[job_type.deduplicate]
strategy = "until_executing"
feature_flag = "dedup_project_export"
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_settings_file_drives_queue_names_and_weights() {
    let file = config_file(
        r#"
log_level = "debug"

[naming]
root_prefix = "Gitlab"

[namespace_weights]
importers = 7
"#,
    );
    let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
    assert_eq!(settings.log_level, "debug");
    // the partial table is layered over the built-in weights
    assert_eq!(settings.weight_for_namespace("pipeline_processing"), Some(5));

    let registry = JobTypeRegistry::from_settings(&settings);
    registry
        .register_definitions(&parse_definitions(DEFINITIONS).unwrap())
        .unwrap();

    let stage = registry.get("Gitlab::Import::StageWorker").unwrap();
    assert_eq!(stage.queue_name(), "importers:import_stage");
    assert_eq!(stage.weight(), 7);

    // subtypes inherit namespace and tags, but get their own queue
    let advance = registry.get("Gitlab::Import::AdvanceStageWorker").unwrap();
    assert_eq!(advance.queue_name(), "importers:import_advance_stage");
    assert_eq!(advance.weight(), 7);
    assert!(advance.has_tag("import"));

    // explicit weight wins; unknown namespace would fall back to 1
    assert_eq!(registry.weight("Gitlab::Projects::ExportWorker").unwrap(), 4);

    assert_eq!(
        registry.queues().into_iter().collect::<Vec<_>>(),
        vec![
            "importers:import_advance_stage".to_string(),
            "importers:import_stage".to_string(),
            "project_export:projects_export".to_string(),
        ]
    );
    assert_eq!(registry.tagged("import").len(), 2);
}

#[test]
fn test_invalid_settings_file_is_rejected() {
    let file = config_file("[namespace_weights]\nimporters = 0\n");
    assert!(Settings::load(Some(file.path().to_str().unwrap())).is_err());
}

#[test]
fn test_feature_flags_gate_relaxed_attributes() {
    let registry = JobTypeRegistry::from_settings(&Settings {
        naming: workerkit_types::NamingSettings {
            root_prefix: "Gitlab".to_string(),
            default_namespace: None,
        },
        ..Settings::default()
    });
    registry
        .register_definitions(&parse_definitions(DEFINITIONS).unwrap())
        .unwrap();
    let advance = registry.get("Gitlab::Import::AdvanceStageWorker").unwrap();
    let export = registry.get("Gitlab::Projects::ExportWorker").unwrap();

    let flags = StaticFeatureFlags::new();
    assert_eq!(advance.data_consistency(), DataConsistency::Sticky);
    assert_eq!(advance.effective_data_consistency(&flags), DataConsistency::Always);
    assert!(!export.deduplication_enabled(&flags));

    flags.enable("load_balancing_for_import");
    flags.enable("dedup_project_export");
    assert_eq!(advance.effective_data_consistency(&flags), DataConsistency::Sticky);
    assert!(export.deduplication_enabled(&flags));
    assert_eq!(export.deduplication_strategy(), "until_executing");
}

#[test]
fn test_idempotent_subtype_cannot_relax_consistency() {
    let registry = JobTypeRegistry::default();
    registry
        .register(
            JobTypeBuilder::new("App::Projects::ExportWorker")
                .idempotent()
                .unwrap(),
        )
        .unwrap();

    let result = registry
        .subtype("App::Projects::ExportWorker", "App::Projects::FastExportWorker")
        .unwrap()
        .data_consistency(DataConsistency::Delayed, None);

    assert!(matches!(result, Err(AttributeError::InvalidCombination(_))));
    assert!(!registry.is_registered("App::Projects::FastExportWorker"));
}

#[test]
fn test_queue_names_are_stable_across_registries() {
    let first = JobTypeRegistry::default();
    let second = JobTypeRegistry::default();

    for registry in [&first, &second] {
        registry
            .register(JobTypeBuilder::new("App::Ci::HTTPArchiveTraceWorker").queue_namespace("pipeline_background"))
            .unwrap();
    }

    assert_eq!(
        first.queue_name("App::Ci::HTTPArchiveTraceWorker").unwrap(),
        "pipeline_background:ci_http_archive_trace"
    );
    assert_eq!(
        first.queue_name("App::Ci::HTTPArchiveTraceWorker").unwrap(),
        second.queue_name("App::Ci::HTTPArchiveTraceWorker").unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_has_one_winner() {
    let registry = Arc::new(JobTypeRegistry::default());

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.register(JobTypeBuilder::new("App::MailerWorker")) })
        })
        .collect();

    let mut registered = 0;
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => registered += 1,
            Err(AttributeError::AlreadyRegistered(name)) => {
                assert_eq!(name, "App::MailerWorker");
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(registered, 1);
    assert_eq!(rejected, 15);
    assert_eq!(registry.len(), 1);
}
