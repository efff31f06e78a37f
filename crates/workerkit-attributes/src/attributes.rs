//! Enumerated job-type attributes.
//!
//! These are scheduling and routing hints. The broker's own scheduler and
//! the database router consume them; this crate only validates and stores
//! them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AttributeError;

/// How quickly a job type must start once enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Latency-sensitive; expected to start within seconds.
    High,
    #[default]
    Low,
    /// Intentionally held back to protect shared resources.
    Throttled,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "high",
            Urgency::Low => "low",
            Urgency::Throttled => "throttled",
        }
    }
}

impl FromStr for Urgency {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Urgency::High),
            "low" => Ok(Urgency::Low),
            "throttled" => Ok(Urgency::Throttled),
            other => Err(AttributeError::invalid("urgency", other)),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Whether a job's reads may target a lagging replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataConsistency {
    /// Always read from the primary.
    #[default]
    Always,
    /// Read from a replica that has caught up, else fall back to the primary.
    Sticky,
    /// Retry later when no caught-up replica is available.
    Delayed,
}

impl DataConsistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataConsistency::Always => "always",
            DataConsistency::Sticky => "sticky",
            DataConsistency::Delayed => "delayed",
        }
    }

    /// True when reads may be routed to replicas.
    pub fn utilizes_replicas(&self) -> bool {
        !matches!(self, DataConsistency::Always)
    }
}

impl FromStr for DataConsistency {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(DataConsistency::Always),
            "sticky" => Ok(DataConsistency::Sticky),
            "delayed" => Ok(DataConsistency::Delayed),
            other => Err(AttributeError::invalid("data consistency", other)),
        }
    }
}

impl fmt::Display for DataConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which resource a job type is bound by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceBoundary {
    Memory,
    Cpu,
    #[default]
    Unknown,
}

impl ResourceBoundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceBoundary::Memory => "memory",
            ResourceBoundary::Cpu => "cpu",
            ResourceBoundary::Unknown => "unknown",
        }
    }
}

impl FromStr for ResourceBoundary {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(ResourceBoundary::Memory),
            "cpu" => Ok(ResourceBoundary::Cpu),
            "unknown" => Ok(ResourceBoundary::Unknown),
            other => Err(AttributeError::invalid("resource boundary", other)),
        }
    }
}

impl fmt::Display for ResourceBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Product area that owns a job type.
///
/// Serialized as a plain string; `"not_owned"` marks shared infrastructure
/// jobs that no single team owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FeatureCategory {
    NotOwned,
    Owned(String),
}

impl FeatureCategory {
    pub const NOT_OWNED: &'static str = "not_owned";

    pub fn as_str(&self) -> &str {
        match self {
            FeatureCategory::NotOwned => Self::NOT_OWNED,
            FeatureCategory::Owned(name) => name,
        }
    }
}

impl FromStr for FeatureCategory {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(AttributeError::invalid("feature category", s)),
            Self::NOT_OWNED => Ok(FeatureCategory::NotOwned),
            name => Ok(FeatureCategory::Owned(name.to_string())),
        }
    }
}

impl TryFrom<String> for FeatureCategory {
    type Error = AttributeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FeatureCategory> for String {
    fn from(category: FeatureCategory) -> Self {
        category.as_str().to_string()
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Urgency::default(), Urgency::Low);
        assert_eq!(DataConsistency::default(), DataConsistency::Always);
        assert_eq!(ResourceBoundary::default(), ResourceBoundary::Unknown);
    }

    #[test]
    fn test_urgency_parse() {
        assert_eq!("high".parse::<Urgency>().unwrap(), Urgency::High);
        assert_eq!("throttled".parse::<Urgency>().unwrap(), Urgency::Throttled);

        let err = "urgent".parse::<Urgency>().unwrap_err();
        assert!(matches!(
            err,
            AttributeError::InvalidAttribute { attribute: "urgency", .. }
        ));
    }

    #[test]
    fn test_data_consistency_parse() {
        assert_eq!(
            "sticky".parse::<DataConsistency>().unwrap(),
            DataConsistency::Sticky
        );
        assert!("eventual".parse::<DataConsistency>().is_err());
    }

    #[test]
    fn test_utilizes_replicas() {
        assert!(!DataConsistency::Always.utilizes_replicas());
        assert!(DataConsistency::Sticky.utilizes_replicas());
        assert!(DataConsistency::Delayed.utilizes_replicas());
    }

    #[test]
    fn test_resource_boundary_parse() {
        assert_eq!(
            "cpu".parse::<ResourceBoundary>().unwrap(),
            ResourceBoundary::Cpu
        );
        assert!("disk".parse::<ResourceBoundary>().is_err());
    }

    #[test]
    fn test_feature_category() {
        assert_eq!(
            "not_owned".parse::<FeatureCategory>().unwrap(),
            FeatureCategory::NotOwned
        );
        assert_eq!(
            "source_code_management".parse::<FeatureCategory>().unwrap(),
            FeatureCategory::Owned("source_code_management".to_string())
        );
        assert!("".parse::<FeatureCategory>().is_err());
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&Urgency::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&FeatureCategory::NotOwned).unwrap(),
            "\"not_owned\""
        );
        let boundary: ResourceBoundary = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(boundary, ResourceBoundary::Memory);
    }
}
