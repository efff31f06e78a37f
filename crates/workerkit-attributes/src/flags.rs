//! Feature-flag evaluation seam.

/// Evaluates feature flags.
///
/// Descriptors consult flags to decide whether deduplication is active and
/// whether a relaxed data-consistency setting applies. Implementations
/// usually wrap a cached flag client, so evaluation is synchronous.
pub trait FeatureFlags: Send + Sync {
    /// Whether `flag` is enabled.
    fn is_enabled(&self, flag: &str) -> bool;
}
