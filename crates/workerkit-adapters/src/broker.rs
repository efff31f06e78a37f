//! Job broker interface.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use workerkit_attributes::JobTypeDescriptor;
use workerkit_types::JobArgs;

use crate::error::AdapterError;

/// The persistent queue jobs are pushed to.
///
/// Jobs land on `descriptor.queue_name()`. Returned ids are opaque.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Push one job for immediate execution.
    async fn enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args: JobArgs,
    ) -> Result<String, AdapterError>;

    /// Push many jobs of one type in a single call.
    async fn bulk_enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
    ) -> Result<Vec<String>, AdapterError>;

    /// Push many jobs of one type to run at `at`.
    async fn bulk_enqueue_at(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, AdapterError>;
}

/// One broker call as recorded by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnqueuedBatch {
    pub job_type: String,
    pub queue: String,
    pub args_list: Vec<JobArgs>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub job_ids: Vec<String>,
}

/// Broker that records every push instead of delivering it.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    batches: Mutex<Vec<EnqueuedBatch>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call, oldest first.
    pub fn batches(&self) -> Vec<EnqueuedBatch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of broker calls made.
    pub fn call_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Arguments of every job pushed for `job_type`, across calls.
    pub fn jobs_for(&self, job_type: &str) -> Vec<JobArgs> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|batch| batch.job_type == job_type)
            .flat_map(|batch| batch.args_list.iter().cloned())
            .collect()
    }

    pub fn clear(&self) {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Vec<String> {
        let job_ids: Vec<String> = args_list
            .iter()
            .map(|_| Uuid::new_v4().simple().to_string())
            .collect();

        debug!(
            job_type = %descriptor.type_name(),
            queue = %descriptor.queue_name(),
            count = args_list.len(),
            scheduled = scheduled_at.is_some(),
            "Recorded enqueue"
        );

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EnqueuedBatch {
                job_type: descriptor.type_name().to_string(),
                queue: descriptor.queue_name().to_string(),
                args_list,
                scheduled_at,
                job_ids: job_ids.clone(),
            });
        job_ids
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args: JobArgs,
    ) -> Result<String, AdapterError> {
        self.record(descriptor, vec![args], None)
            .pop()
            .ok_or_else(|| AdapterError::backend("no job id assigned"))
    }

    async fn bulk_enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
    ) -> Result<Vec<String>, AdapterError> {
        Ok(self.record(descriptor, args_list, None))
    }

    async fn bulk_enqueue_at(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, AdapterError> {
        Ok(self.record(descriptor, args_list, Some(at)))
    }
}
