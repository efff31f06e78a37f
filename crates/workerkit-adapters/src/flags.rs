//! Fixed feature flag set.

use dashmap::DashSet;

use workerkit_attributes::FeatureFlags;

/// Feature flags held in memory and toggled explicitly.
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    enabled: DashSet<String>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags enabled from the start.
    pub fn with_enabled<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let enabled = DashSet::new();
        for flag in flags {
            enabled.insert(flag.into());
        }
        Self { enabled }
    }

    pub fn enable(&self, flag: impl Into<String>) {
        self.enabled.insert(flag.into());
    }

    pub fn disable(&self, flag: &str) {
        self.enabled.remove(flag);
    }
}

impl FeatureFlags for StaticFeatureFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workerkit_attributes::{DataConsistency, JobTypeBuilder, JobTypeRegistry};

    #[test]
    fn test_toggle() {
        let flags = StaticFeatureFlags::with_enabled(["a"]);
        assert!(flags.is_enabled("a"));
        assert!(!flags.is_enabled("b"));

        flags.enable("b");
        flags.disable("a");
        assert!(!flags.is_enabled("a"));
        assert!(flags.is_enabled("b"));
    }

    #[test]
    fn test_gates_data_consistency() {
        let registry = JobTypeRegistry::default();
        let descriptor = registry
            .register(
                JobTypeBuilder::new("App::ReplicaWorker")
                    .data_consistency(DataConsistency::Delayed, Some("replica_reads"))
                    .unwrap(),
            )
            .unwrap();

        let flags = StaticFeatureFlags::new();
        assert_eq!(
            descriptor.effective_data_consistency(&flags),
            DataConsistency::Always
        );

        flags.enable("replica_reads");
        assert_eq!(
            descriptor.effective_data_consistency(&flags),
            DataConsistency::Delayed
        );
    }
}
