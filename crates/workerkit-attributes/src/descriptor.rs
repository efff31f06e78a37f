//! Job type descriptors and the builder that validates them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::naming::join_queue_name;
use crate::{
    AttributeError, DataConsistency, FeatureCategory, FeatureFlags, QueueNaming,
    ResourceBoundary, Urgency,
};

/// Deduplication strategy used when a type does not configure one.
pub const DEFAULT_DEDUPLICATION_STRATEGY: &str = "until_executing";

/// Immutable, validated attributes of one job type.
///
/// Descriptors are only produced by [`JobTypeBuilder::build`], so every
/// descriptor satisfies the idempotency/consistency invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTypeDescriptor {
    type_name: String,
    queue_namespace: Option<String>,
    base_queue_name: String,
    queue_name: String,
    urgency: Urgency,
    data_consistency: DataConsistency,
    data_consistency_feature_flag: Option<String>,
    resource_boundary: ResourceBoundary,
    explicit_weight: Option<u32>,
    weight: u32,
    tags: BTreeSet<String>,
    idempotent: bool,
    deduplication_strategy: Option<String>,
    deduplication_options: BTreeMap<String, Value>,
    deduplication_feature_flag: Option<String>,
    external_dependencies: bool,
    big_payload: bool,
    feature_category: Option<FeatureCategory>,
    max_retries: Option<u32>,
}

impl JobTypeDescriptor {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn queue_namespace(&self) -> Option<&str> {
        self.queue_namespace.as_deref()
    }

    pub fn base_queue_name(&self) -> &str {
        &self.base_queue_name
    }

    /// Queue the broker routes this type to.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn urgency(&self) -> Urgency {
        self.urgency
    }

    /// Consistency as declared, ignoring any feature flag.
    pub fn data_consistency(&self) -> DataConsistency {
        self.data_consistency
    }

    pub fn data_consistency_feature_flag(&self) -> Option<&str> {
        self.data_consistency_feature_flag.as_deref()
    }

    /// Consistency that applies right now.
    ///
    /// A relaxed consistency guarded by a feature flag only applies while
    /// the flag is enabled; otherwise reads go to the primary.
    pub fn effective_data_consistency(&self, flags: &dyn FeatureFlags) -> DataConsistency {
        match &self.data_consistency_feature_flag {
            Some(flag) if !flags.is_enabled(flag) => DataConsistency::Always,
            _ => self.data_consistency,
        }
    }

    pub fn resource_boundary(&self) -> ResourceBoundary {
        self.resource_boundary
    }

    /// Resolved weight: explicit, else namespace default, else 1.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn deduplication_strategy(&self) -> &str {
        self.deduplication_strategy
            .as_deref()
            .unwrap_or(DEFAULT_DEDUPLICATION_STRATEGY)
    }

    pub fn deduplication_options(&self) -> &BTreeMap<String, Value> {
        &self.deduplication_options
    }

    /// Deduplication is on unless its feature flag is configured and disabled.
    pub fn deduplication_enabled(&self, flags: &dyn FeatureFlags) -> bool {
        self.deduplication_feature_flag
            .as_deref()
            .map_or(true, |flag| flags.is_enabled(flag))
    }

    pub fn has_external_dependencies(&self) -> bool {
        self.external_dependencies
    }

    pub fn is_big_payload(&self) -> bool {
        self.big_payload
    }

    pub fn feature_category(&self) -> Option<&FeatureCategory> {
        self.feature_category.as_ref()
    }

    /// Broker-level retry count; `None` defers to the broker default.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn retries_disabled(&self) -> bool {
        self.max_retries == Some(0)
    }
}

/// Declares the attributes of one job type.
///
/// Most setters are infallible. `data_consistency` and `idempotent`
/// check the idempotency invariant as soon as they are called so the
/// offending declaration is reported; `build` checks everything again.
#[derive(Debug, Clone)]
pub struct JobTypeBuilder {
    type_name: String,
    queue_namespace: Option<String>,
    urgency: Urgency,
    data_consistency: DataConsistency,
    consistency_set: bool,
    data_consistency_feature_flag: Option<String>,
    resource_boundary: ResourceBoundary,
    weight: Option<u32>,
    tags: BTreeSet<String>,
    idempotent: bool,
    deduplication_strategy: Option<String>,
    deduplication_options: BTreeMap<String, Value>,
    deduplication_feature_flag: Option<String>,
    external_dependencies: bool,
    big_payload: bool,
    feature_category: Option<FeatureCategory>,
    max_retries: Option<u32>,
}

impl JobTypeBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            queue_namespace: None,
            urgency: Urgency::default(),
            data_consistency: DataConsistency::default(),
            consistency_set: false,
            data_consistency_feature_flag: None,
            resource_boundary: ResourceBoundary::default(),
            weight: None,
            tags: BTreeSet::new(),
            idempotent: false,
            deduplication_strategy: None,
            deduplication_options: BTreeMap::new(),
            deduplication_feature_flag: None,
            external_dependencies: false,
            big_payload: false,
            feature_category: None,
            max_retries: None,
        }
    }

    /// Start a subtype from its parent's attributes.
    ///
    /// The queue name is recomputed from the subtype's own name. The
    /// subtype may declare its own data consistency once.
    pub fn inherit(type_name: impl Into<String>, parent: &JobTypeDescriptor) -> Self {
        Self {
            type_name: type_name.into(),
            queue_namespace: parent.queue_namespace.clone(),
            urgency: parent.urgency,
            data_consistency: parent.data_consistency,
            consistency_set: false,
            data_consistency_feature_flag: parent.data_consistency_feature_flag.clone(),
            resource_boundary: parent.resource_boundary,
            weight: parent.explicit_weight,
            tags: parent.tags.clone(),
            idempotent: parent.idempotent,
            deduplication_strategy: parent.deduplication_strategy.clone(),
            deduplication_options: parent.deduplication_options.clone(),
            deduplication_feature_flag: parent.deduplication_feature_flag.clone(),
            external_dependencies: parent.external_dependencies,
            big_payload: parent.big_payload,
            feature_category: parent.feature_category.clone(),
            max_retries: parent.max_retries,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn queue_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.queue_namespace = Some(namespace.into());
        self
    }

    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Set the data consistency, optionally guarded by a feature flag.
    ///
    /// # Errors
    ///
    /// - `AlreadySet` if this type already declared a consistency
    /// - `InvalidCombination` if the type is idempotent and `value` is not `Always`
    pub fn data_consistency(
        mut self,
        value: DataConsistency,
        feature_flag: Option<&str>,
    ) -> Result<Self, AttributeError> {
        if self.consistency_set {
            return Err(AttributeError::AlreadySet(self.type_name));
        }
        self.data_consistency = value;
        self.consistency_set = true;
        if let Some(flag) = feature_flag {
            self.data_consistency_feature_flag = Some(flag.to_string());
        }
        self.validate()?;
        Ok(self)
    }

    /// Mark the type idempotent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCombination` if the data consistency is not `Always`.
    pub fn idempotent(mut self) -> Result<Self, AttributeError> {
        self.idempotent = true;
        self.validate()?;
        Ok(self)
    }

    pub fn resource_boundary(mut self, boundary: ResourceBoundary) -> Self {
        self.resource_boundary = boundary;
        self
    }

    /// Explicit weight. Must be positive; checked by `build`.
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Select a deduplication strategy. The strategy itself is applied by the broker.
    pub fn deduplicate(
        mut self,
        strategy: impl Into<String>,
        options: BTreeMap<String, Value>,
    ) -> Self {
        self.deduplication_strategy = Some(strategy.into());
        self.deduplication_options = options;
        self
    }

    pub fn deduplication_feature_flag(mut self, flag: impl Into<String>) -> Self {
        self.deduplication_feature_flag = Some(flag.into());
        self
    }

    pub fn external_dependencies(mut self) -> Self {
        self.external_dependencies = true;
        self
    }

    pub fn big_payload(mut self) -> Self {
        self.big_payload = true;
        self
    }

    pub fn feature_category(mut self, category: FeatureCategory) -> Self {
        self.feature_category = Some(category);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Declare a self-rescheduling type.
    ///
    /// Broker retries are disabled because the type re-arms itself.
    pub fn recurring(self) -> Self {
        self.max_retries(0)
    }

    fn validate(&self) -> Result<(), AttributeError> {
        // deduplication must see the latest replication position, which only the primary guarantees
        if self.idempotent && self.data_consistency.utilizes_replicas() {
            return Err(AttributeError::InvalidCombination(self.type_name.clone()));
        }
        if self.weight == Some(0) {
            return Err(AttributeError::invalid("weight", "0"));
        }
        Ok(())
    }

    /// Validate and freeze the declaration.
    ///
    /// `namespace_weights` supplies the weight for types without an
    /// explicit one.
    pub fn build(
        self,
        naming: &QueueNaming,
        namespace_weights: &HashMap<String, u32>,
    ) -> Result<JobTypeDescriptor, AttributeError> {
        self.validate()?;

        let queue_namespace = self
            .queue_namespace
            .or_else(|| naming.default_namespace().map(str::to_string));
        let base_queue_name = naming.base_queue_name(&self.type_name)?;
        let queue_name = join_queue_name(queue_namespace.as_deref(), &base_queue_name);

        let weight = self
            .weight
            .or_else(|| {
                queue_namespace
                    .as_deref()
                    .and_then(|ns| namespace_weights.get(ns).copied())
            })
            .unwrap_or(1);

        Ok(JobTypeDescriptor {
            type_name: self.type_name,
            queue_namespace,
            base_queue_name,
            queue_name,
            urgency: self.urgency,
            data_consistency: self.data_consistency,
            data_consistency_feature_flag: self.data_consistency_feature_flag,
            resource_boundary: self.resource_boundary,
            explicit_weight: self.weight,
            weight,
            tags: self.tags,
            idempotent: self.idempotent,
            deduplication_strategy: self.deduplication_strategy,
            deduplication_options: self.deduplication_options,
            deduplication_feature_flag: self.deduplication_feature_flag,
            external_dependencies: self.external_dependencies,
            big_payload: self.big_payload,
            feature_category: self.feature_category,
            max_retries: self.max_retries,
        })
    }
}
