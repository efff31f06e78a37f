//! Units of work delivered by the broker.

use async_trait::async_trait;

use workerkit_attributes::JobTypeDescriptor;
use workerkit_types::JobArgs;

/// Result of a job body. Any error counts as a failure and is retried by
/// the broker unless the type disables retries.
pub type JobResult<T = ()> = anyhow::Result<T>;

/// A job type's implementation.
#[async_trait]
pub trait Job: Send + Sync {
    fn descriptor(&self) -> &JobTypeDescriptor;

    /// Run the job once with the arguments it was enqueued with.
    async fn perform(&self, args: JobArgs) -> JobResult;

    /// Called once the broker gives up retrying.
    async fn on_retries_exhausted(&self, _args: &JobArgs, _error: &str) {}
}
