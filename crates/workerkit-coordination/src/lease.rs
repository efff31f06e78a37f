//! Exclusive lease guard.
//!
//! Runs a body only while holding a lease in the shared [`LeaseStore`], so
//! at most one holder per key executes at a time across every process
//! using the store. Failing to obtain the lease is an expected outcome
//! under concurrent fan-out: the body is skipped and nothing is raised.
//!
//! The lease is released on every exit path of the body, including errors
//! and panics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use workerkit_adapters::LeaseStore;
use workerkit_attributes::underscore;

use crate::error::CoordinationError;
use crate::scope::run_then;

/// What happened to a guarded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome<T> {
    /// The lease was obtained and the body ran.
    Ran(T),

    /// Another holder had the lease; the body did not run.
    Skipped,
}

impl<T> LeaseOutcome<T> {
    pub fn ran(&self) -> bool {
        matches!(self, LeaseOutcome::Ran(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            LeaseOutcome::Ran(value) => Some(value),
            LeaseOutcome::Skipped => None,
        }
    }
}

/// A lease held by this caller.
#[derive(Clone)]
pub struct LeaseHandle {
    store: Arc<dyn LeaseStore>,
    key: String,
    owner_token: String,
    timeout: Duration,
}

impl std::fmt::Debug for LeaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseHandle")
            .field("key", &self.key)
            .field("owner_token", &self.owner_token)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LeaseHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }

    /// Extend the lease by its timeout, measured from now.
    ///
    /// Returns `false` if the lease expired and was taken by someone else.
    pub async fn renew(&self) -> Result<bool, CoordinationError> {
        let renewed = self
            .store
            .renew(&self.key, &self.owner_token, self.timeout)
            .await?;
        if !renewed {
            warn!(lease_key = %self.key, "Lease lost before renewal");
        }
        Ok(renewed)
    }

    /// Give up the lease. Releasing twice is harmless.
    pub async fn release(&self) -> Result<(), CoordinationError> {
        self.store.release(&self.key, &self.owner_token).await?;
        debug!(lease_key = %self.key, "Released lease");
        Ok(())
    }
}

/// Guard over one lease key.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use workerkit_adapters::InMemoryLeaseStore;
/// use workerkit_coordination::{CoordinationError, ExclusiveLease, LeaseOutcome};
///
/// # async fn demo() -> Result<(), CoordinationError> {
/// let lease = ExclusiveLease::for_job_type(
///     Arc::new(InMemoryLeaseStore::new()),
///     "App::Cleanup::OrphansWorker",
///     Duration::from_secs(60),
/// );
/// assert_eq!(lease.key(), "app/cleanup/orphans_worker");
///
/// let outcome = lease
///     .with_lease(|_handle| async { Ok::<_, CoordinationError>(42) })
///     .await?;
/// assert_eq!(outcome, LeaseOutcome::Ran(42));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ExclusiveLease {
    store: Arc<dyn LeaseStore>,
    key: String,
    timeout: Duration,
}

impl ExclusiveLease {
    pub fn new(store: Arc<dyn LeaseStore>, key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            timeout,
        }
    }

    /// Guard keyed by the underscored job type name.
    pub fn for_job_type(store: Arc<dyn LeaseStore>, type_name: &str, timeout: Duration) -> Self {
        Self::new(store, underscore(type_name), timeout)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Try once to take the lease. Never waits for the current holder.
    pub async fn try_obtain(&self) -> Result<Option<LeaseHandle>, CoordinationError> {
        let token = self.store.try_acquire(&self.key, self.timeout).await?;
        Ok(token.map(|owner_token| LeaseHandle {
            store: self.store.clone(),
            key: self.key.clone(),
            owner_token,
            timeout: self.timeout,
        }))
    }

    /// Run `body` while holding the lease.
    ///
    /// Returns `Skipped` without running `body` when the lease is held
    /// elsewhere. Otherwise the lease is released after `body` finishes,
    /// whether it returned `Ok`, returned `Err` or panicked. An error from
    /// `body` takes precedence over a release failure.
    pub async fn with_lease<F, Fut, T, E>(&self, body: F) -> Result<LeaseOutcome<T>, E>
    where
        F: FnOnce(LeaseHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoordinationError>,
    {
        let Some(handle) = self.try_obtain().await? else {
            warn!(lease_key = %self.key, "Lease held elsewhere, skipping");
            return Ok(LeaseOutcome::Skipped);
        };
        debug!(lease_key = %self.key, timeout_secs = self.timeout.as_secs(), "Obtained lease");

        let (result, released) = run_then(body(handle.clone()), || handle.release()).await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(LeaseOutcome::Ran(value)),
            (Ok(_), Err(release_error)) => Err(release_error.into()),
            (Err(body_error), released) => {
                if let Err(release_error) = released {
                    warn!(lease_key = %self.key, error = %release_error, "Lease release failed");
                }
                Err(body_error)
            }
        }
    }

    /// Token of the current holder, if any.
    pub async fn current_owner(&self) -> Result<Option<String>, CoordinationError> {
        Ok(self.store.current_owner(&self.key).await?)
    }

    /// Whether anyone holds the lease.
    pub async fn exists(&self) -> Result<bool, CoordinationError> {
        Ok(self.current_owner().await?.is_some())
    }
}
