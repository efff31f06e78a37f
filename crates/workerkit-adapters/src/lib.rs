//! # workerkit-adapters
//!
//! Interfaces to the external collaborators of the workerkit job layer,
//! plus in-process implementations of each.
//!
//! ## Core Components
//!
//! - [`LeaseStore`]: try-acquire / renew / release / read-owner of exclusive leases
//! - [`RendezvousStore`]: countdown counters a waiter can block on
//! - [`Broker`]: the persistent job queue
//! - [`SharedCache`]: shared set storage used to publish healthy shards
//! - [`Clock`]: wall clock and sleep, injectable for tests
//! - [`Job`]: a unit of work the broker delivers to a worker
//!
//! The `InMemory*` implementations hold all state in the current process.
//! They give the same atomicity guarantees as a shared store, but only
//! among tasks of one process, so they suit tests and single-process
//! deployments.

pub mod broker;
pub mod cache;
pub mod clock;
pub mod error;
pub mod flags;
pub mod job;
pub mod lease;
pub mod rendezvous;

pub use broker::{Broker, EnqueuedBatch, InMemoryBroker};
pub use cache::{InMemoryCache, SharedCache};
pub use clock::{elapsed_since, millis, Clock, ManualClock, SystemClock};
pub use error::AdapterError;
pub use flags::StaticFeatureFlags;
pub use job::{Job, JobResult};
pub use lease::{InMemoryLeaseStore, LeaseStore};
pub use rendezvous::{InMemoryRendezvousStore, RendezvousStore};
