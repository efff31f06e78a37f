//! Bulk dispatch and the dispatch-and-wait rendezvous.
//!
//! Small batches run in-process. Larger batches are pushed to the broker
//! with a rendezvous key appended to each job's arguments; every job
//! decrements the counter under that key when it finishes, and the
//! dispatcher waits for the count to reach zero or for its timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use workerkit_adapters::{Broker, Clock, Job, JobResult, RendezvousStore, SystemClock};
use workerkit_attributes::JobTypeDescriptor;
use workerkit_types::{DispatchSettings, JobArgs};

use crate::error::CoordinationError;
use crate::scope::run_then;

/// Prefix of every rendezvous key.
pub const RENDEZVOUS_KEY_PREFIX: &str = "workerkit:rendezvous:";

/// Identifies one dispatch-and-wait batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousToken {
    key: String,
    expected_count: u64,
}

impl RendezvousToken {
    pub fn new(expected_count: u64) -> Self {
        Self {
            key: format!("{}{}", RENDEZVOUS_KEY_PREFIX, Uuid::new_v4()),
            expected_count,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn expected_count(&self) -> u64 {
        self.expected_count
    }

    /// Whether `value` looks like a rendezvous key.
    pub fn is_key(value: &str) -> bool {
        value
            .strip_prefix(RENDEZVOUS_KEY_PREFIX)
            .is_some_and(|id| Uuid::parse_str(id).is_ok())
    }
}

/// Spread of a delayed batch over time.
///
/// Jobs are pushed in groups of `size`; group `n` runs `n * delay` after
/// the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSchedule {
    pub size: usize,
    pub delay: chrono::Duration,
}

impl BatchSchedule {
    pub fn new(size: usize, delay: chrono::Duration) -> Self {
        Self { size, delay }
    }

    fn validate(&self) -> Result<(), CoordinationError> {
        if self.size == 0 {
            return Err(CoordinationError::InvalidBatch(
                "size must be greater than 0".to_string(),
            ));
        }
        if self.delay <= chrono::Duration::zero() {
            return Err(CoordinationError::InvalidBatch(
                "delay must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of running a batch in-process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineReport {
    /// Items that ran successfully.
    pub performed: usize,

    /// Items that failed and were pushed to the broker instead.
    pub redispatched: usize,
}

/// Result of [`BulkDispatcher::dispatch_and_wait`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchReport {
    /// Small batch run in-process.
    Inline(InlineReport),

    /// Batch pushed to the broker; `completed` is how many jobs signalled
    /// before the wait ended.
    Awaited { expected: u64, completed: u64 },
}

impl DispatchReport {
    /// Whether every job is known to have finished.
    ///
    /// Inline runs count as complete: failed items were handed to the
    /// broker's retry path.
    pub fn is_complete(&self) -> bool {
        match self {
            DispatchReport::Inline(_) => true,
            DispatchReport::Awaited {
                expected,
                completed,
            } => completed >= expected,
        }
    }
}

/// Pushes batches of jobs to the broker.
pub struct BulkDispatcher {
    broker: Arc<dyn Broker>,
    rendezvous: Arc<dyn RendezvousStore>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl BulkDispatcher {
    pub fn new(
        broker: Arc<dyn Broker>,
        rendezvous: Arc<dyn RendezvousStore>,
        settings: DispatchSettings,
    ) -> Self {
        Self::with_clock(broker, rendezvous, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(
        broker: Arc<dyn Broker>,
        rendezvous: Arc<dyn RendezvousStore>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            broker,
            rendezvous,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    fn push_limit(&self) -> usize {
        self.settings.bulk_push_limit.max(1)
    }

    /// Push a batch for immediate execution.
    ///
    /// One broker call per `bulk_push_limit` items; an empty batch makes no
    /// call at all.
    pub async fn bulk_enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
    ) -> Result<Vec<String>, CoordinationError> {
        let mut job_ids = Vec::with_capacity(args_list.len());
        for chunk in args_list.chunks(self.push_limit()) {
            job_ids.extend(self.broker.bulk_enqueue(descriptor, chunk.to_vec()).await?);
        }
        debug!(job_type = %descriptor.type_name(), count = job_ids.len(), "Bulk enqueued");
        Ok(job_ids)
    }

    /// Push a batch to run after `delay`.
    ///
    /// Fails with `InvalidSchedule` unless `now + delay` is strictly in the
    /// future. With a `schedule`, groups of `schedule.size` jobs are spread
    /// `schedule.delay` apart starting at `now + delay`.
    pub async fn bulk_enqueue_delayed(
        &self,
        descriptor: &JobTypeDescriptor,
        delay: chrono::Duration,
        args_list: Vec<JobArgs>,
        schedule: Option<BatchSchedule>,
    ) -> Result<Vec<String>, CoordinationError> {
        let now = self.clock.now();
        let scheduled_at = now.checked_add_signed(delay).ok_or_else(|| {
            CoordinationError::InvalidBatch(format!("delay of {delay} is out of range"))
        })?;
        if scheduled_at <= now {
            return Err(CoordinationError::InvalidSchedule { scheduled_at, now });
        }

        let (group_size, spacing) = match schedule {
            Some(schedule) => {
                schedule.validate()?;
                (schedule.size.min(self.push_limit()), Some(schedule))
            }
            None => (self.push_limit(), None),
        };

        // every push time is computed before the first push, so an
        // out-of-range spread leaves the broker untouched
        let mut groups = Vec::new();
        let mut offset = 0;
        for chunk in args_list.chunks(group_size) {
            let at = match spacing {
                Some(schedule) => {
                    let group = i32::try_from(offset / schedule.size).unwrap_or(i32::MAX);
                    schedule
                        .delay
                        .checked_mul(group)
                        .and_then(|spread| scheduled_at.checked_add_signed(spread))
                        .ok_or_else(|| {
                            CoordinationError::InvalidBatch(format!(
                                "group {group} at {} spacing is out of range",
                                schedule.delay
                            ))
                        })?
                }
                None => scheduled_at,
            };
            groups.push((chunk, at));
            offset += chunk.len();
        }

        let mut job_ids = Vec::with_capacity(args_list.len());
        for (chunk, at) in groups {
            job_ids.extend(self.broker.bulk_enqueue_at(descriptor, chunk.to_vec(), at).await?);
        }

        debug!(
            job_type = %descriptor.type_name(),
            count = job_ids.len(),
            scheduled_at = %scheduled_at,
            "Bulk enqueued with delay"
        );
        Ok(job_ids)
    }

    /// Run every item in-process.
    ///
    /// A failing item does not stop the rest. Failed items are pushed to
    /// the broker in one batch afterwards so they get the broker's retries.
    pub async fn dispatch_inline(
        &self,
        job: &dyn Job,
        args_list: Vec<JobArgs>,
    ) -> Result<InlineReport, CoordinationError> {
        let descriptor = job.descriptor();
        let mut performed = 0;
        let mut failed = Vec::new();

        for args in args_list {
            match job.perform(args.clone()).await {
                Ok(()) => performed += 1,
                Err(e) => {
                    warn!(job_type = %descriptor.type_name(), error = %e, "Inline job failed, redispatching");
                    failed.push(args);
                }
            }
        }

        let redispatched = failed.len();
        if !failed.is_empty() {
            self.bulk_enqueue(descriptor, failed).await?;
        }

        Ok(InlineReport {
            performed,
            redispatched,
        })
    }

    /// Run a batch and wait for it to finish.
    ///
    /// Batches no larger than `inline_threshold` run in-process and never
    /// touch the rendezvous store. Larger batches go through the broker and
    /// the call waits up to `timeout` (default: `wait_timeout_secs`).
    /// Running out of time is not an error; the report carries the partial
    /// count.
    pub async fn dispatch_and_wait(
        &self,
        job: &dyn Job,
        args_list: Vec<JobArgs>,
        timeout: Option<Duration>,
    ) -> Result<DispatchReport, CoordinationError> {
        if args_list.len() <= self.settings.inline_threshold {
            return Ok(DispatchReport::Inline(
                self.dispatch_inline(job, args_list).await?,
            ));
        }

        let descriptor = job.descriptor();
        let token = RendezvousToken::new(u64::try_from(args_list.len()).unwrap_or(u64::MAX));
        let timeout = timeout.unwrap_or_else(|| self.settings.wait_timeout());

        self.rendezvous
            .create_counter(token.key(), token.expected_count())
            .await?;

        let tagged: Vec<JobArgs> = args_list
            .into_iter()
            .map(|mut args| {
                args.push(Value::String(token.key().to_string()));
                args
            })
            .collect();

        if let Err(e) = self.bulk_enqueue(descriptor, tagged).await {
            self.discard(&token).await;
            return Err(e);
        }

        let waited = self
            .rendezvous
            .block_until_zero(token.key(), timeout)
            .await;
        self.discard(&token).await;
        let completed = waited?;

        if completed < token.expected_count() {
            warn!(
                job_type = %descriptor.type_name(),
                expected = token.expected_count(),
                completed,
                timeout_secs = timeout.as_secs(),
                "Rendezvous timed out"
            );
        } else {
            info!(job_type = %descriptor.type_name(), completed, "Rendezvous complete");
        }

        Ok(DispatchReport::Awaited {
            expected: token.expected_count(),
            completed,
        })
    }

    async fn discard(&self, token: &RendezvousToken) {
        if let Err(e) = self.rendezvous.discard(token.key()).await {
            warn!(rendezvous_key = %token.key(), error = %e, "Failed to discard rendezvous counter");
        }
    }
}

/// Run a job body and signal its rendezvous, if it has one.
///
/// A trailing rendezvous key is stripped from `args` before `body` sees
/// them. The counter is decremented exactly once after `body` finishes,
/// whether it succeeded, failed or panicked. The body's result is returned
/// unchanged.
pub async fn perform_with_rendezvous<F, Fut, T>(
    store: &dyn RendezvousStore,
    mut args: JobArgs,
    body: F,
) -> JobResult<T>
where
    F: FnOnce(JobArgs) -> Fut,
    Fut: Future<Output = JobResult<T>>,
{
    let key = match args.last() {
        Some(Value::String(last)) if RendezvousToken::is_key(last) => match args.pop() {
            Some(Value::String(key)) => Some(key),
            _ => None,
        },
        _ => None,
    };

    let Some(key) = key else {
        return body(args).await;
    };

    let (result, ()) = run_then(body(args), || signal(store, &key)).await;
    result
}

async fn signal(store: &dyn RendezvousStore, key: &str) {
    match store.decrement_and_check(key).await {
        Ok(Some(0)) => debug!(rendezvous_key = %key, "Last rendezvous signal"),
        Ok(Some(remaining)) => debug!(rendezvous_key = %key, remaining, "Rendezvous signal"),
        Ok(None) => info!(rendezvous_key = %key, "Rendezvous already discarded, signal ignored"),
        Err(e) => warn!(rendezvous_key = %key, error = %e, "Rendezvous signal failed"),
    }
}
