//! Queue name derivation.
//!
//! A job type named `App::Projects::ImportExport::ExportWorker` with the
//! namespace `project_export` routes to the queue
//! `project_export:projects_import_export_export`.

use serde::{Deserialize, Serialize};

use workerkit_types::NamingSettings;

use crate::AttributeError;

/// Suffix stripped from job type names.
pub const WORKER_SUFFIX: &str = "Worker";

/// Convert a CamelCase, `::`-separated type name into a snake_case path.
///
/// `Projects::HTTPImportWorker` becomes `projects/http_import_worker`.
pub fn underscore(type_name: &str) -> String {
    let path = type_name.replace("::", "/");
    let chars: Vec<char> = path.chars().collect();
    let mut out = String::with_capacity(path.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            // "fooBar" and "v2Api" split before the capital; "HTTPServer" splits before "Server"
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        if c == '-' {
            out.push('_');
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }

    out
}

/// Derives base and fully-qualified queue names from type names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueNaming {
    root_prefix: String,
    default_namespace: Option<String>,
}

impl Default for QueueNaming {
    fn default() -> Self {
        Self::from_settings(&NamingSettings::default())
    }
}

impl QueueNaming {
    pub fn new(root_prefix: impl Into<String>) -> Self {
        Self {
            root_prefix: root_prefix.into(),
            default_namespace: None,
        }
    }

    pub fn from_settings(settings: &NamingSettings) -> Self {
        Self {
            root_prefix: settings.root_prefix.clone(),
            default_namespace: settings.default_namespace.clone(),
        }
    }

    /// Namespace applied to types that do not declare one.
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Queue name without namespace.
    ///
    /// Strips the root prefix and the `Worker` suffix, then folds the
    /// remaining path into a single underscore-joined segment.
    ///
    /// # Errors
    ///
    /// Returns `AttributeError::InvalidTypeName` if the name is not a
    /// `::`-separated list of identifiers or nothing is left after
    /// stripping.
    pub fn base_queue_name(&self, type_name: &str) -> Result<String, AttributeError> {
        validate_type_name(type_name)?;

        let mut name = type_name;
        if !self.root_prefix.is_empty() {
            if let Some(rest) = name
                .strip_prefix(self.root_prefix.as_str())
                .and_then(|rest| rest.strip_prefix("::"))
            {
                name = rest;
            }
        }
        let name = name.strip_suffix(WORKER_SUFFIX).unwrap_or(name);

        let base = underscore(name).replace('/', "_");
        if base.is_empty() || base.ends_with('_') {
            return Err(AttributeError::InvalidTypeName(type_name.to_string()));
        }
        Ok(base)
    }

    /// Fully-qualified queue name: `namespace:base` or just `base`.
    ///
    /// An explicit namespace wins over the configured default.
    pub fn queue_name(
        &self,
        type_name: &str,
        namespace: Option<&str>,
    ) -> Result<String, AttributeError> {
        let base = self.base_queue_name(type_name)?;
        let namespace = namespace.or(self.default_namespace.as_deref());
        Ok(join_queue_name(namespace, &base))
    }
}

pub(crate) fn join_queue_name(namespace: Option<&str>, base: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}:{base}"),
        _ => base.to_string(),
    }
}

fn validate_type_name(type_name: &str) -> Result<(), AttributeError> {
    let valid = !type_name.is_empty()
        && type_name.split("::").all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(AttributeError::InvalidTypeName(type_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore() {
        assert_eq!(underscore("ExportWorker"), "export_worker");
        assert_eq!(underscore("Projects::ExportWorker"), "projects/export_worker");
        assert_eq!(underscore("HTTPServer"), "http_server");
        assert_eq!(underscore("V2Api"), "v2_api");
        assert_eq!(underscore("already_snake"), "already_snake");
    }

    #[test]
    fn test_base_queue_name_strips_prefix_and_suffix() {
        let naming = QueueNaming::new("App");
        assert_eq!(
            naming.base_queue_name("App::Projects::ImportExport::ExportWorker").unwrap(),
            "projects_import_export_export"
        );
        assert_eq!(
            naming.base_queue_name("RepositoryCleanupWorker").unwrap(),
            "repository_cleanup"
        );
    }

    #[test]
    fn test_root_prefix_only_stripped_as_whole_segment() {
        let naming = QueueNaming::new("App");
        assert_eq!(
            naming.base_queue_name("AppSettingsWorker").unwrap(),
            "app_settings"
        );
    }

    #[test]
    fn test_queue_name_with_and_without_namespace() {
        let naming = QueueNaming::new("App");
        assert_eq!(
            naming.queue_name("App::MailerWorker", None).unwrap(),
            "mailer"
        );
        assert_eq!(
            naming.queue_name("App::MailerWorker", Some("notifications")).unwrap(),
            "notifications:mailer"
        );
    }

    #[test]
    fn test_default_namespace_applies_when_none_declared() {
        let naming = QueueNaming::new("App").with_default_namespace("cronjob");
        assert_eq!(
            naming.queue_name("App::PruneWorker", None).unwrap(),
            "cronjob:prune"
        );
        assert_eq!(
            naming.queue_name("App::PruneWorker", Some("gc")).unwrap(),
            "gc:prune"
        );
    }

    #[test]
    fn test_queue_name_is_stable() {
        let naming = QueueNaming::default();
        let first = naming
            .queue_name("App::Ci::BuildWorker", Some("pipeline_default"))
            .unwrap();
        for _ in 0..10 {
            let again = naming
                .queue_name("App::Ci::BuildWorker", Some("pipeline_default"))
                .unwrap();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_invalid_type_names() {
        let naming = QueueNaming::default();
        assert!(naming.base_queue_name("").is_err());
        assert!(naming.base_queue_name("Foo::").is_err());
        assert!(naming.base_queue_name("Foo Bar").is_err());
        assert!(naming.base_queue_name("Worker").is_err());
        assert!(naming.base_queue_name("App::Worker").is_err());
    }
}
