//! Exclusive lease storage.
//!
//! A lease is a key held by exactly one owner until it is released or its
//! timeout passes. Every mutation is a single check-and-set against the
//! store; nothing reads a lease and then writes it in a second step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{deadline_after, AdapterError};

/// Store backing exclusive leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease if nobody holds it.
    ///
    /// Returns the new owner token, or `None` when another owner holds an
    /// unexpired lease.
    async fn try_acquire(&self, key: &str, timeout: Duration)
        -> Result<Option<String>, AdapterError>;

    /// Extend a held lease. Returns `false` if `owner_token` no longer holds it.
    async fn renew(&self, key: &str, owner_token: &str, timeout: Duration)
        -> Result<bool, AdapterError>;

    /// Release a lease. A no-op unless `owner_token` holds it.
    async fn release(&self, key: &str, owner_token: &str) -> Result<(), AdapterError>;

    /// Token of the current holder, if any.
    async fn current_owner(&self, key: &str) -> Result<Option<String>, AdapterError>;
}

#[derive(Debug, Clone)]
struct LeaseEntry {
    owner: String,
    expires_at: DateTime<Utc>,
}

/// Process-local lease store.
pub struct InMemoryLeaseStore {
    leases: DashMap<String, LeaseEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` to decide lease expiry.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: DashMap::new(),
            clock,
        }
    }

    /// Number of stored leases, including expired ones not yet replaced.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, AdapterError> {
        let now = self.clock.now();
        let fresh = LeaseEntry {
            owner: Uuid::new_v4().to_string(),
            expires_at: deadline_after(now, timeout)?,
        };
        let token = fresh.owner.clone();

        // the shard lock is held for the whole match, making this a single check-and-set
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) if entry.get().expires_at <= now => {
                debug!(lease_key = %key, "Replacing expired lease");
                entry.insert(fresh);
                Ok(Some(token))
            }
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                Ok(Some(token))
            }
        }
    }

    async fn renew(
        &self,
        key: &str,
        owner_token: &str,
        timeout: Duration,
    ) -> Result<bool, AdapterError> {
        let now = self.clock.now();
        let extended = deadline_after(now, timeout)?;

        match self.leases.get_mut(key) {
            Some(mut entry) if entry.owner == owner_token && entry.expires_at > now => {
                entry.expires_at = extended;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner_token: &str) -> Result<(), AdapterError> {
        if self
            .leases
            .remove_if(key, |_, entry| entry.owner == owner_token)
            .is_none()
        {
            debug!(lease_key = %key, "Release ignored: token does not hold the lease");
        }
        Ok(())
    }

    async fn current_owner(&self, key: &str) -> Result<Option<String>, AdapterError> {
        let now = self.clock.now();
        Ok(self
            .leases
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.owner.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let store = InMemoryLeaseStore::new();

        let first = store.try_acquire("k", TIMEOUT).await.unwrap();
        assert!(first.is_some());

        let second = store.try_acquire("k", TIMEOUT).await.unwrap();
        assert!(second.is_none());

        assert_eq!(store.current_owner("k").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let store = InMemoryLeaseStore::new();
        let token = store.try_acquire("k", TIMEOUT).await.unwrap().unwrap();

        store.release("k", "someone-else").await.unwrap();
        assert_eq!(store.current_owner("k").await.unwrap(), Some(token.clone()));

        store.release("k", &token).await.unwrap();
        assert_eq!(store.current_owner("k").await.unwrap(), None);
        assert!(store.try_acquire("k", TIMEOUT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryLeaseStore::with_clock(clock.clone());

        let old = store.try_acquire("k", TIMEOUT).await.unwrap().unwrap();
        clock.advance(Duration::from_secs(11));

        assert_eq!(store.current_owner("k").await.unwrap(), None);
        let new = store.try_acquire("k", TIMEOUT).await.unwrap().unwrap();
        assert_ne!(old, new);

        // the stale owner can neither renew nor release the new lease
        assert!(!store.renew("k", &old, TIMEOUT).await.unwrap());
        store.release("k", &old).await.unwrap();
        assert_eq!(store.current_owner("k").await.unwrap(), Some(new));
    }

    #[tokio::test]
    async fn test_renew_extends_expiry() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryLeaseStore::with_clock(clock.clone());
        let token = store.try_acquire("k", TIMEOUT).await.unwrap().unwrap();

        clock.advance(Duration::from_secs(8));
        assert!(store.renew("k", &token, TIMEOUT).await.unwrap());

        clock.advance(Duration::from_secs(8));
        assert_eq!(store.current_owner("k").await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_timeout_beyond_timestamp_range_is_an_error() {
        let store = InMemoryLeaseStore::new();
        let huge = Duration::from_secs(10_000_000_000_000);

        assert!(matches!(
            store.try_acquire("k", huge).await,
            Err(AdapterError::Backend(_))
        ));
        assert!(store.is_empty());

        let token = store.try_acquire("k", TIMEOUT).await.unwrap().unwrap();
        assert!(store.renew("k", &token, huge).await.is_err());
        assert_eq!(store.current_owner("k").await.unwrap(), Some(token));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_single_winner() {
        let store = Arc::new(InMemoryLeaseStore::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.try_acquire("k", TIMEOUT).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
