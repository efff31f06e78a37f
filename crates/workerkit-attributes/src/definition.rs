//! Declarative job type definitions.
//!
//! Job types can be declared in TOML instead of code:
//!
//! ```toml
//! [[job_type]]
//! name = "App::Projects::ExportWorker"
//! queue_namespace = "project_export"
//! urgency = "high"
//! idempotent = true
//!
//! [[job_type]]
//! name = "App::Projects::LargeExportWorker"
//! parent = "App::Projects::ExportWorker"
//! resource_boundary = "memory"
//! ```
//!
//! Enumerated values arrive as strings and are validated when applied,
//! so a typo fails registration with `InvalidAttribute`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    AttributeError, DataConsistency, FeatureCategory, JobTypeBuilder, JobTypeDescriptor,
    JobTypeRegistry, ResourceBoundary, Urgency,
};

/// Deduplication section of a definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeduplicationDefinition {
    pub strategy: String,

    #[serde(default)]
    pub options: BTreeMap<String, Value>,

    #[serde(default)]
    pub feature_flag: Option<String>,
}

/// One job type as written in a definitions file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobTypeDefinition {
    pub name: String,

    /// Registered type to inherit attributes from.
    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub queue_namespace: Option<String>,

    #[serde(default)]
    pub urgency: Option<String>,

    #[serde(default)]
    pub data_consistency: Option<String>,

    #[serde(default)]
    pub data_consistency_feature_flag: Option<String>,

    #[serde(default)]
    pub resource_boundary: Option<String>,

    #[serde(default)]
    pub weight: Option<u32>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub idempotent: bool,

    #[serde(default)]
    pub deduplicate: Option<DeduplicationDefinition>,

    #[serde(default)]
    pub external_dependencies: bool,

    #[serde(default)]
    pub big_payload: bool,

    #[serde(default)]
    pub feature_category: Option<String>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Self-rescheduling type; disables broker retries.
    #[serde(default)]
    pub recurring: bool,
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    #[serde(default, rename = "job_type")]
    job_types: Vec<JobTypeDefinition>,
}

/// Parse a TOML document of `[[job_type]]` tables.
pub fn parse_definitions(text: &str) -> Result<Vec<JobTypeDefinition>, AttributeError> {
    let file: DefinitionFile =
        toml::from_str(text).map_err(|e| AttributeError::Definition(e.to_string()))?;
    Ok(file.job_types)
}

impl JobTypeDefinition {
    /// Apply this definition's attributes to a builder.
    ///
    /// Data consistency is applied before idempotency so either order of
    /// declaration reports the same `InvalidCombination`.
    pub fn apply(&self, builder: JobTypeBuilder) -> Result<JobTypeBuilder, AttributeError> {
        let mut builder = builder;

        if let Some(namespace) = &self.queue_namespace {
            builder = builder.queue_namespace(namespace.clone());
        }
        if let Some(urgency) = &self.urgency {
            builder = builder.urgency(urgency.parse::<Urgency>()?);
        }
        if self.data_consistency.is_none() && self.data_consistency_feature_flag.is_some() {
            return Err(AttributeError::Definition(format!(
                "{}: data_consistency_feature_flag requires data_consistency",
                self.name
            )));
        }
        if let Some(consistency) = &self.data_consistency {
            builder = builder.data_consistency(
                consistency.parse::<DataConsistency>()?,
                self.data_consistency_feature_flag.as_deref(),
            )?;
        }
        if let Some(boundary) = &self.resource_boundary {
            builder = builder.resource_boundary(boundary.parse::<ResourceBoundary>()?);
        }
        if let Some(weight) = self.weight {
            builder = builder.weight(weight);
        }
        builder = builder.tags(self.tags.iter().cloned());
        if self.idempotent {
            builder = builder.idempotent()?;
        }
        if let Some(dedup) = &self.deduplicate {
            builder = builder.deduplicate(dedup.strategy.clone(), dedup.options.clone());
            if let Some(flag) = &dedup.feature_flag {
                builder = builder.deduplication_feature_flag(flag.clone());
            }
        }
        if self.external_dependencies {
            builder = builder.external_dependencies();
        }
        if self.big_payload {
            builder = builder.big_payload();
        }
        if let Some(category) = &self.feature_category {
            builder = builder.feature_category(category.parse::<FeatureCategory>()?);
        }
        if let Some(retries) = self.max_retries {
            builder = builder.max_retries(retries);
        }
        if self.recurring {
            builder = builder.recurring();
        }

        Ok(builder)
    }
}

impl JobTypeRegistry {
    /// Register definitions in order.
    ///
    /// A parent must be registered before (or earlier in the list than)
    /// its subtypes. Registration stops at the first error; types
    /// registered before it stay registered.
    pub fn register_definitions(
        &self,
        definitions: &[JobTypeDefinition],
    ) -> Result<Vec<Arc<JobTypeDescriptor>>, AttributeError> {
        definitions
            .iter()
            .map(|definition| {
                let builder = match &definition.parent {
                    Some(parent) => self.subtype(parent, definition.name.clone())?,
                    None => JobTypeBuilder::new(definition.name.clone()),
                };
                self.register(definition.apply(builder)?)
            })
            .collect()
    }
}
