//! Shared cache holding string sets with a time-to-live.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::{deadline_after, AdapterError};

/// Shared set storage.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Replace the set at `key` with `members`, expiring after `ttl`.
    ///
    /// An empty `members` stores an empty set; it does not delete the key.
    async fn replace_set(
        &self,
        key: &str,
        members: &BTreeSet<String>,
        ttl: Duration,
    ) -> Result<(), AdapterError>;

    /// Read the set at `key`. `None` when missing or expired.
    async fn read_set(&self, key: &str) -> Result<Option<BTreeSet<String>>, AdapterError>;

    async fn delete(&self, key: &str) -> Result<(), AdapterError>;
}

struct CachedSet {
    members: BTreeSet<String>,
    expires_at: DateTime<Utc>,
}

/// Process-local cache.
pub struct InMemoryCache {
    sets: DashMap<String, CachedSet>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sets: DashMap::new(),
            clock,
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn replace_set(
        &self,
        key: &str,
        members: &BTreeSet<String>,
        ttl: Duration,
    ) -> Result<(), AdapterError> {
        let expires_at = deadline_after(self.clock.now(), ttl)?;
        self.sets.insert(
            key.to_string(),
            CachedSet {
                members: members.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn read_set(&self, key: &str) -> Result<Option<BTreeSet<String>>, AdapterError> {
        let now = self.clock.now();
        // drop the read guard before removing
        let found = self
            .sets
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.members.clone()));

        match found {
            Some((true, members)) => Ok(Some(members)),
            Some((false, _)) => {
                self.sets.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AdapterError> {
        self.sets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn set(members: &[&str]) -> BTreeSet<String> {
        members.iter().map(|m| m.to_string()).collect()
    }

    #[tokio::test]
    async fn test_replace_and_read() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);

        cache.replace_set("k", &set(&["a", "b"]), ttl).await.unwrap();
        cache.replace_set("k", &set(&["c"]), ttl).await.unwrap();
        assert_eq!(cache.read_set("k").await.unwrap(), Some(set(&["c"])));

        cache.replace_set("k", &BTreeSet::new(), ttl).await.unwrap();
        assert_eq!(cache.read_set("k").await.unwrap(), Some(BTreeSet::new()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.read_set("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let clock = Arc::new(ManualClock::default());
        let cache = InMemoryCache::with_clock(clock.clone());

        cache
            .replace_set("k", &set(&["a"]), Duration::from_secs(600))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(599));
        assert!(cache.read_set("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.read_set("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_beyond_timestamp_range_is_an_error() {
        let cache = InMemoryCache::new();
        let result = cache
            .replace_set("k", &set(&["a"]), Duration::from_secs(10_000_000_000_000))
            .await;
        assert!(matches!(result, Err(AdapterError::Backend(_))));
        assert_eq!(cache.read_set("k").await.unwrap(), None);
    }
}
