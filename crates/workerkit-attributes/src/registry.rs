//! Registry of job type descriptors.
//!
//! The `JobTypeRegistry` maps type names to immutable descriptors. Types
//! are registered once at process start; lookups happen on every dispatch
//! and may come from many tasks at once.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use workerkit_types::{default_namespace_weights, Settings};

use crate::{AttributeError, JobTypeBuilder, JobTypeDescriptor, QueueNaming};

/// Registry of declared job types.
///
/// # Example
///
/// ```
/// use workerkit_attributes::{JobTypeBuilder, JobTypeRegistry};
///
/// let registry = JobTypeRegistry::default();
/// registry.register(JobTypeBuilder::new("App::MailerWorker").queue_namespace("notifications"))?;
///
/// assert_eq!(registry.queue_name("App::MailerWorker")?, "notifications:mailer");
/// assert_eq!(registry.weight("App::MailerWorker")?, 2);
/// # Ok::<(), workerkit_attributes::AttributeError>(())
/// ```
pub struct JobTypeRegistry {
    types: DashMap<String, Arc<JobTypeDescriptor>>,
    naming: QueueNaming,
    namespace_weights: HashMap<String, u32>,
}

impl JobTypeRegistry {
    /// Create an empty registry.
    pub fn new(naming: QueueNaming, namespace_weights: HashMap<String, u32>) -> Self {
        Self {
            types: DashMap::new(),
            naming,
            namespace_weights,
        }
    }

    /// Create an empty registry configured from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            QueueNaming::from_settings(&settings.naming),
            settings.namespace_weights.clone(),
        )
    }

    pub fn naming(&self) -> &QueueNaming {
        &self.naming
    }

    /// Validate and register a job type.
    ///
    /// # Errors
    ///
    /// Returns any validation error from the builder, or
    /// `AlreadyRegistered` if the name is taken.
    pub fn register(&self, builder: JobTypeBuilder) -> Result<Arc<JobTypeDescriptor>, AttributeError> {
        let descriptor = Arc::new(builder.build(&self.naming, &self.namespace_weights)?);

        match self.types.entry(descriptor.type_name().to_string()) {
            Entry::Occupied(entry) => Err(AttributeError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(
                    job_type = %descriptor.type_name(),
                    queue = %descriptor.queue_name(),
                    weight = descriptor.weight(),
                    "Registered job type"
                );
                entry.insert(descriptor.clone());
                Ok(descriptor)
            }
        }
    }

    /// Start declaring a subtype of an already registered type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownJobType` if `parent` is not registered.
    pub fn subtype(
        &self,
        parent: &str,
        type_name: impl Into<String>,
    ) -> Result<JobTypeBuilder, AttributeError> {
        let parent = self.get(parent)?;
        Ok(JobTypeBuilder::inherit(type_name, &parent))
    }

    /// Get a registered descriptor.
    ///
    /// # Errors
    ///
    /// Returns `UnknownJobType` if the type is not registered.
    pub fn get(&self, type_name: &str) -> Result<Arc<JobTypeDescriptor>, AttributeError> {
        self.find(type_name)
            .ok_or_else(|| AttributeError::UnknownJobType(type_name.to_string()))
    }

    /// Get a registered descriptor, or `None`.
    pub fn find(&self, type_name: &str) -> Option<Arc<JobTypeDescriptor>> {
        self.types.get(type_name).map(|entry| entry.value().clone())
    }

    pub fn queue_name(&self, type_name: &str) -> Result<String, AttributeError> {
        self.get(type_name).map(|d| d.queue_name().to_string())
    }

    pub fn weight(&self, type_name: &str) -> Result<u32, AttributeError> {
        self.get(type_name).map(|d| d.weight())
    }

    /// Every distinct queue name in use.
    pub fn queues(&self) -> BTreeSet<String> {
        self.types
            .iter()
            .map(|entry| entry.value().queue_name().to_string())
            .collect()
    }

    /// Registered types carrying `tag`, sorted by name.
    pub fn tagged(&self, tag: &str) -> Vec<Arc<JobTypeDescriptor>> {
        let mut tagged: Vec<_> = self
            .types
            .iter()
            .filter(|entry| entry.value().has_tag(tag))
            .map(|entry| entry.value().clone())
            .collect();
        tagged.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        tagged
    }

    /// All registered types, sorted by name.
    pub fn all(&self) -> Vec<Arc<JobTypeDescriptor>> {
        let mut all: Vec<_> = self.types.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        all
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for JobTypeRegistry {
    fn default() -> Self {
        Self::new(QueueNaming::default(), default_namespace_weights())
    }
}
