//! Shard health aggregation.
//!
//! A shard is eligible only if it passed every configured health check.
//! The eligible set is published to the shared cache so other components
//! can discover it without running the checks themselves.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use workerkit_adapters::SharedCache;
use workerkit_types::ShardHealthSettings;

use crate::error::CoordinationError;

/// One shard's result from one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCheckResult {
    pub shard: String,
    pub success: bool,
}

impl ShardCheckResult {
    pub fn passed(shard: impl Into<String>) -> Self {
        Self {
            shard: shard.into(),
            success: true,
        }
    }

    pub fn failed(shard: impl Into<String>) -> Self {
        Self {
            shard: shard.into(),
            success: false,
        }
    }
}

/// An independent readiness check over every shard.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn readiness(&self) -> Vec<ShardCheckResult>;
}

/// Intersects health checks into the set of eligible shards.
pub struct ShardHealthAggregator {
    checks: Vec<Arc<dyn HealthCheck>>,
    cache: Arc<dyn SharedCache>,
    settings: ShardHealthSettings,
}

impl ShardHealthAggregator {
    pub fn new(
        checks: Vec<Arc<dyn HealthCheck>>,
        cache: Arc<dyn SharedCache>,
        settings: ShardHealthSettings,
    ) -> Self {
        Self {
            checks,
            cache,
            settings,
        }
    }

    /// Run every check, intersect the passing shards and publish the result.
    ///
    /// A shard reported as failed by a check is excluded even if the same
    /// check also reports it as passing. With no checks configured nothing
    /// is eligible.
    pub async fn eligible_shards(&self) -> Result<BTreeSet<String>, CoordinationError> {
        let reports = join_all(self.checks.iter().map(|check| check.readiness())).await;

        let mut eligible: Option<BTreeSet<String>> = None;
        for (check, results) in self.checks.iter().zip(reports) {
            let failed: BTreeSet<&str> = results
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.shard.as_str())
                .collect();
            let passed: BTreeSet<String> = results
                .iter()
                .filter(|r| r.success && !failed.contains(r.shard.as_str()))
                .map(|r| r.shard.clone())
                .collect();

            if passed.is_empty() {
                warn!(check = %check.name(), "Health check passed no shards");
            } else {
                debug!(check = %check.name(), passed = passed.len(), failed = failed.len(), "Health check finished");
            }

            eligible = Some(match eligible {
                None => passed,
                Some(current) => current.intersection(&passed).cloned().collect(),
            });
        }
        let eligible = eligible.unwrap_or_default();

        self.cache
            .replace_set(&self.settings.cache_key, &eligible, self.settings.ttl())
            .await?;
        info!(
            checks = self.checks.len(),
            eligible = eligible.len(),
            "Published healthy shards"
        );

        Ok(eligible)
    }

    /// Last published set, or empty if nothing is cached.
    pub async fn cached_shards(&self) -> Result<BTreeSet<String>, CoordinationError> {
        Ok(self
            .cache
            .read_set(&self.settings.cache_key)
            .await?
            .unwrap_or_default())
    }

    pub async fn is_healthy(&self, shard: &str) -> Result<bool, CoordinationError> {
        Ok(self.cached_shards().await?.contains(shard))
    }

    pub async fn healthy_count(&self) -> Result<usize, CoordinationError> {
        Ok(self.cached_shards().await?.len())
    }

    /// Drop the published set.
    pub async fn clear(&self) -> Result<(), CoordinationError> {
        self.cache.delete(&self.settings.cache_key).await?;
        Ok(())
    }
}
