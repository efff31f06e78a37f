//! Countdown counters for the dispatch-and-wait rendezvous.
//!
//! A dispatcher creates a counter holding the number of jobs it pushed.
//! Each job decrements the counter once when it finishes, and the
//! dispatcher blocks until the counter reaches zero or a timeout passes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::error::AdapterError;

/// Store holding rendezvous counters.
#[async_trait]
pub trait RendezvousStore: Send + Sync {
    /// Create a counter at `count`, replacing any existing counter at `key`.
    async fn create_counter(&self, key: &str, count: u64) -> Result<(), AdapterError>;

    /// Atomically decrement the counter and return the remaining count.
    ///
    /// Returns `None` when no counter exists at `key` (it was discarded,
    /// or never created). The count never goes below zero.
    async fn decrement_and_check(&self, key: &str) -> Result<Option<u64>, AdapterError>;

    /// Wait until the counter reaches zero or `timeout` passes.
    ///
    /// Returns how many decrements had been observed when the wait ended.
    /// Fails with `NotFound` if no counter exists at `key`.
    async fn block_until_zero(&self, key: &str, timeout: Duration) -> Result<u64, AdapterError>;

    /// Remove the counter. Later decrements report `None`.
    async fn discard(&self, key: &str) -> Result<(), AdapterError>;
}

struct Counter {
    expected: u64,
    remaining: watch::Sender<u64>,
}

/// Process-local rendezvous store.
#[derive(Default)]
pub struct InMemoryRendezvousStore {
    counters: DashMap<String, Arc<Counter>>,
}

impl InMemoryRendezvousStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining count at `key`, if a counter exists.
    pub fn remaining(&self, key: &str) -> Option<u64> {
        self.counters.get(key).map(|counter| *counter.remaining.borrow())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn counter(&self, key: &str) -> Option<Arc<Counter>> {
        self.counters.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl RendezvousStore for InMemoryRendezvousStore {
    async fn create_counter(&self, key: &str, count: u64) -> Result<(), AdapterError> {
        let (remaining, _) = watch::channel(count);
        self.counters.insert(
            key.to_string(),
            Arc::new(Counter {
                expected: count,
                remaining,
            }),
        );
        Ok(())
    }

    async fn decrement_and_check(&self, key: &str) -> Result<Option<u64>, AdapterError> {
        let Some(counter) = self.counter(key) else {
            debug!(rendezvous_key = %key, "Decrement on missing counter");
            return Ok(None);
        };

        let mut left = 0;
        counter.remaining.send_modify(|remaining| {
            *remaining = remaining.saturating_sub(1);
            left = *remaining;
        });
        Ok(Some(left))
    }

    async fn block_until_zero(&self, key: &str, timeout: Duration) -> Result<u64, AdapterError> {
        let counter = self
            .counter(key)
            .ok_or_else(|| AdapterError::NotFound(key.to_string()))?;
        let mut receiver = counter.remaining.subscribe();

        // a timeout is not an error; the caller reads the partial count
        let _ = tokio::time::timeout(timeout, receiver.wait_for(|remaining| *remaining == 0)).await;

        let remaining = *counter.remaining.borrow();
        Ok(counter.expected - remaining)
    }

    async fn discard(&self, key: &str) -> Result<(), AdapterError> {
        self.counters.remove(key);
        Ok(())
    }
}
