//! Concurrency control for workerkit jobs.
//!
//! This crate builds on the adapter traits in `workerkit-adapters` to
//! coordinate jobs running across many worker processes.
//!
//! # Features
//!
//! - [`ExclusiveLease`]: run a body under a store-wide lease, skipping it
//!   when another holder is active
//! - [`Reenqueuer`]: recurring jobs that re-arm themselves while work remains
//! - [`BulkDispatcher`]: bulk and delayed enqueue, inline dispatch, and
//!   dispatch-and-wait over a rendezvous counter
//! - [`RetryBackoff`]: linear and geometric retry curves
//! - [`run_bounded`]: work loops bounded by wall-clock time
//! - [`ShardHealthAggregator`]: conjunctive health across shard checks
//!
//! # Example
//!
//! ```ignore
//! use workerkit_coordination::{ExclusiveLease, LeaseOutcome};
//!
//! let lease = ExclusiveLease::for_job_type(store, "App::Gc::SweepWorker", Duration::from_secs(300));
//! match lease.with_lease(|handle| async move { sweep(&handle).await }).await? {
//!     LeaseOutcome::Ran(swept) => tracing::info!(swept, "Sweep finished"),
//!     LeaseOutcome::Skipped => {}
//! }
//! ```

mod backoff;
mod bounded;
mod dispatch;
mod error;
mod lease;
mod reenqueuer;
mod scope;
mod shard_health;

pub use backoff::{
    default_backoff, geometric_backoff, linear_backoff, RetryBackoff, DEFAULT_LINEAR_RETRIES,
};
pub use bounded::{run_bounded, BoundedLoopOutcome, LoopStop, RuntimeLimiter};
pub use dispatch::{
    perform_with_rendezvous, BatchSchedule, BulkDispatcher, DispatchReport, InlineReport,
    RendezvousToken, RENDEZVOUS_KEY_PREFIX,
};
pub use error::CoordinationError;
pub use lease::{ExclusiveLease, LeaseHandle, LeaseOutcome};
pub use reenqueuer::{RecurringJob, ReenqueueOutcome, Reenqueuer};
pub use shard_health::{HealthCheck, ShardCheckResult, ShardHealthAggregator};
