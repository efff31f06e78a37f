//! Self-rescheduling jobs.
//!
//! An external scheduler triggers a recurring job on a fixed cadence. The
//! [`Reenqueuer`] turns each trigger into at most one running instance:
//! if an instance already holds the job's lease the trigger is a no-op,
//! otherwise the body runs once and, when it reports more work, the job
//! immediately enqueues another instance of itself.
//!
//! Fast bodies are padded out to a minimum duration so a job with plenty
//! of work does not spin through the broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use workerkit_adapters::{
    elapsed_since, millis, Broker, Clock, Job, JobResult, LeaseStore, SystemClock,
};
use workerkit_attributes::{underscore, JobTypeDescriptor};
use workerkit_types::{JobArgs, ReenqueueSettings};

use crate::lease::{ExclusiveLease, LeaseOutcome};

/// A job body driven by a [`Reenqueuer`].
#[async_trait]
pub trait RecurringJob: Send + Sync {
    fn descriptor(&self) -> &JobTypeDescriptor;

    /// How long the lease is held. Must exceed the longest possible run.
    fn lease_timeout(&self) -> Duration;

    /// Per-type minimum run duration; `None` uses the configured default.
    fn minimum_duration(&self) -> Option<Duration> {
        None
    }

    fn lease_key(&self) -> String {
        underscore(self.descriptor().type_name())
    }

    /// Do one slice of work. Return `true` to run again right away.
    ///
    /// `args` are the arguments of the trigger; a re-armed instance
    /// receives the same ones.
    async fn run_once(&self, args: &JobArgs) -> JobResult<bool>;
}

/// What one trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReenqueueOutcome {
    /// Another instance held the lease; nothing ran.
    LeaseTaken,

    /// The body ran. `elapsed` is the body's own run time, before padding.
    Completed { reenqueued: bool, elapsed: Duration },
}

/// Runs a [`RecurringJob`] under its lease and re-arms it.
pub struct Reenqueuer<J> {
    job: J,
    leases: Arc<dyn LeaseStore>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    settings: ReenqueueSettings,
}

impl<J: RecurringJob> Reenqueuer<J> {
    pub fn new(
        job: J,
        leases: Arc<dyn LeaseStore>,
        broker: Arc<dyn Broker>,
        settings: ReenqueueSettings,
    ) -> Self {
        Self::with_clock(job, leases, broker, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(
        job: J,
        leases: Arc<dyn LeaseStore>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
        settings: ReenqueueSettings,
    ) -> Self {
        if !job.descriptor().retries_disabled() {
            warn!(
                job_type = %job.descriptor().type_name(),
                "Recurring job type has broker retries enabled; declare it with recurring()"
            );
        }
        Self {
            job,
            leases,
            broker,
            clock,
            settings,
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn minimum_duration(&self) -> Duration {
        self.job
            .minimum_duration()
            .unwrap_or_else(|| self.settings.minimum_duration())
    }

    pub fn lease(&self) -> ExclusiveLease {
        ExclusiveLease::new(
            self.leases.clone(),
            self.job.lease_key(),
            self.job.lease_timeout(),
        )
    }

    /// Handle one trigger.
    ///
    /// Takes the lease or returns `LeaseTaken`. Runs the body, sleeps out
    /// the rest of the minimum duration, enqueues the next instance with
    /// the same `args` if the body asked for it, then releases the lease. An error from the body
    /// skips the sleep and the enqueue and is returned after the lease is
    /// released.
    pub async fn run_cycle(&self, args: JobArgs) -> JobResult<ReenqueueOutcome> {
        let descriptor = self.job.descriptor();

        let outcome = self
            .lease()
            .with_lease(|_handle| async move {
                let start = self.clock.now();
                let reenqueue = self.job.run_once(&args).await?;
                let elapsed = elapsed_since(self.clock.as_ref(), start);

                let minimum = self.minimum_duration();
                if elapsed < minimum {
                    debug!(
                        job_type = %descriptor.type_name(),
                        elapsed_ms = millis(elapsed),
                        "Padding run to minimum duration"
                    );
                    self.clock.sleep(minimum - elapsed).await;
                }

                if reenqueue {
                    self.broker.enqueue(descriptor, args).await?;
                }
                Ok::<_, anyhow::Error>(ReenqueueOutcome::Completed {
                    reenqueued: reenqueue,
                    elapsed,
                })
            })
            .await?;

        match outcome {
            LeaseOutcome::Ran(completed) => {
                info!(job_type = %descriptor.type_name(), ?completed, "Recurring run finished");
                Ok(completed)
            }
            LeaseOutcome::Skipped => Ok(ReenqueueOutcome::LeaseTaken),
        }
    }
}

#[async_trait]
impl<J: RecurringJob> Job for Reenqueuer<J> {
    fn descriptor(&self) -> &JobTypeDescriptor {
        self.job.descriptor()
    }

    async fn perform(&self, args: JobArgs) -> JobResult {
        self.run_cycle(args).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use workerkit_adapters::{InMemoryBroker, InMemoryLeaseStore, ManualClock};
    use workerkit_attributes::{JobTypeBuilder, JobTypeRegistry};

    /// Reports more work `remaining` times, then stops.
    struct Countdown {
        descriptor: Arc<JobTypeDescriptor>,
        remaining: AtomicU32,
        run_time: Duration,
        clock: Arc<ManualClock>,
        fail: bool,
    }

    #[async_trait]
    impl RecurringJob for Countdown {
        fn descriptor(&self) -> &JobTypeDescriptor {
            &self.descriptor
        }

        fn lease_timeout(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn run_once(&self, _args: &JobArgs) -> JobResult<bool> {
            self.clock.advance(self.run_time);
            anyhow::ensure!(!self.fail, "run failed");
            let before = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .unwrap_or(0);
            Ok(before > 0)
        }
    }

    struct Fixture {
        leases: Arc<InMemoryLeaseStore>,
        broker: Arc<InMemoryBroker>,
        clock: Arc<ManualClock>,
        reenqueuer: Reenqueuer<Countdown>,
    }

    fn fixture(remaining: u32, run_time: Duration, fail: bool) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let leases = Arc::new(InMemoryLeaseStore::with_clock(clock.clone()));
        let broker = Arc::new(InMemoryBroker::new());
        let descriptor = JobTypeRegistry::default()
            .register(JobTypeBuilder::new("App::Cleanup::OrphansWorker").recurring())
            .unwrap();
        let job = Countdown {
            descriptor,
            remaining: AtomicU32::new(remaining),
            run_time,
            clock: clock.clone(),
            fail,
        };
        let reenqueuer = Reenqueuer::with_clock(
            job,
            leases.clone(),
            broker.clone(),
            clock.clone(),
            ReenqueueSettings::default(),
        );
        Fixture {
            leases,
            broker,
            clock,
            reenqueuer,
        }
    }

    #[tokio::test]
    async fn test_reenqueues_while_work_remains() {
        let f = fixture(2, Duration::from_secs(1), false);

        for _ in 0..2 {
            let outcome = f.reenqueuer.run_cycle(JobArgs::new()).await.unwrap();
            assert!(matches!(
                outcome,
                ReenqueueOutcome::Completed {
                    reenqueued: true,
                    ..
                }
            ));
        }
        let outcome = f.reenqueuer.run_cycle(JobArgs::new()).await.unwrap();
        assert!(matches!(
            outcome,
            ReenqueueOutcome::Completed {
                reenqueued: false,
                ..
            }
        ));

        assert_eq!(f.broker.call_count(), 2);
        assert_eq!(f.broker.jobs_for("App::Cleanup::OrphansWorker"), vec![JobArgs::new(); 2]);
        assert!(!f.reenqueuer.lease().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_fast_body_padded_to_minimum_duration() {
        let f = fixture(1, Duration::from_secs(2), false);

        let outcome = f.reenqueuer.run_cycle(JobArgs::new()).await.unwrap();

        assert_eq!(
            outcome,
            ReenqueueOutcome::Completed {
                reenqueued: true,
                elapsed: Duration::from_secs(2)
            }
        );
        assert_eq!(f.clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_slow_body_not_padded() {
        let f = fixture(0, Duration::from_secs(7), false);
        f.reenqueuer.run_cycle(JobArgs::new()).await.unwrap();
        assert!(f.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_noop_while_lease_held() {
        let f = fixture(5, Duration::from_secs(1), false);
        let holder = f.reenqueuer.lease().try_obtain().await.unwrap().unwrap();

        let outcome = f.reenqueuer.run_cycle(JobArgs::new()).await.unwrap();

        assert_eq!(outcome, ReenqueueOutcome::LeaseTaken);
        assert_eq!(f.broker.call_count(), 0);
        assert_eq!(
            f.leases
                .current_owner(holder.key())
                .await
                .unwrap()
                .as_deref(),
            Some(holder.owner_token())
        );
    }

    #[tokio::test]
    async fn test_error_releases_lease_and_propagates() {
        let f = fixture(5, Duration::from_secs(1), true);

        let err = f.reenqueuer.run_cycle(JobArgs::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "run failed");
        assert_eq!(f.broker.call_count(), 0);
        assert!(f.clock.sleeps().is_empty());
        assert!(!f.reenqueuer.lease().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_runs_as_job() {
        let f = fixture(1, Duration::from_secs(10), false);
        let job: &dyn Job = &f.reenqueuer;

        job.perform(JobArgs::new()).await.unwrap();
        assert_eq!(job.descriptor().queue_name(), "cleanup_orphans");
        assert_eq!(f.broker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rearmed_instance_keeps_trigger_args() {
        let f = fixture(1, Duration::from_secs(1), false);
        let args = vec![serde_json::json!("shard_b"), serde_json::json!(500)];

        f.reenqueuer.run_cycle(args.clone()).await.unwrap();

        assert_eq!(f.broker.jobs_for("App::Cleanup::OrphansWorker"), vec![args]);
    }

    #[test]
    fn test_default_lease_key_and_minimum() {
        let f = fixture(0, Duration::ZERO, false);
        assert_eq!(f.reenqueuer.lease().key(), "app/cleanup/orphans_worker");
        assert_eq!(f.reenqueuer.minimum_duration(), Duration::from_secs(5));
    }
}
