//! End-to-end test infrastructure for workerkit.
//!
//! Provides a shared TestHarness wiring the in-process adapters together,
//! plus a broker that actually delivers pushed jobs to registered
//! implementations on spawned tasks, the way worker processes would.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use workerkit_adapters::{
    AdapterError, Broker, Clock, InMemoryBroker, InMemoryCache, InMemoryLeaseStore,
    InMemoryRendezvousStore, Job, JobResult, ManualClock, RendezvousStore,
};
use workerkit_attributes::{JobTypeBuilder, JobTypeDescriptor, JobTypeRegistry};
use workerkit_coordination::{perform_with_rendezvous, BulkDispatcher};
use workerkit_types::{JobArgs, Settings};

/// Broker that records every push and runs immediate jobs.
///
/// Each pushed job runs on its own task after `delivery_delay`, through
/// [`perform_with_rendezvous`]. Scheduled pushes are only recorded.
pub struct DeliveringBroker {
    recorder: InMemoryBroker,
    jobs: DashMap<String, Arc<dyn Job>>,
    rendezvous: Arc<dyn RendezvousStore>,
    delivery_delay: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl DeliveringBroker {
    pub fn new(rendezvous: Arc<dyn RendezvousStore>, delivery_delay: Duration) -> Self {
        Self {
            recorder: InMemoryBroker::new(),
            jobs: DashMap::new(),
            rendezvous,
            delivery_delay,
            tasks: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Route pushes of `job`'s type to `job`.
    pub fn register(&self, job: Arc<dyn Job>) {
        self.jobs
            .insert(job.descriptor().type_name().to_string(), job);
    }

    /// The recording broker underneath.
    pub fn recorded(&self) -> &InMemoryBroker {
        &self.recorder
    }

    /// Error messages of delivered jobs that failed.
    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until every delivered job, including ones enqueued by other
    /// delivered jobs, has finished.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<_> = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            if pending.is_empty() {
                break;
            }
            for task in pending {
                task.await.expect("delivered job panicked");
            }
        }
    }

    fn deliver(&self, descriptor: &JobTypeDescriptor, args_list: Vec<JobArgs>) {
        let Some(job) = self.jobs.get(descriptor.type_name()).map(|j| j.value().clone()) else {
            return;
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for args in args_list {
            let job = job.clone();
            let rendezvous = self.rendezvous.clone();
            let failures = self.failures.clone();
            let delay = self.delivery_delay;
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let result =
                    perform_with_rendezvous(rendezvous.as_ref(), args, |args| job.perform(args))
                        .await;
                if let Err(e) = result {
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(e.to_string());
                }
            }));
        }
    }
}

#[async_trait]
impl Broker for DeliveringBroker {
    async fn enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args: JobArgs,
    ) -> Result<String, AdapterError> {
        let id = self.recorder.enqueue(descriptor, args.clone()).await?;
        self.deliver(descriptor, vec![args]);
        Ok(id)
    }

    async fn bulk_enqueue(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
    ) -> Result<Vec<String>, AdapterError> {
        let ids = self
            .recorder
            .bulk_enqueue(descriptor, args_list.clone())
            .await?;
        self.deliver(descriptor, args_list);
        Ok(ids)
    }

    async fn bulk_enqueue_at(
        &self,
        descriptor: &JobTypeDescriptor,
        args_list: Vec<JobArgs>,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, AdapterError> {
        self.recorder.bulk_enqueue_at(descriptor, args_list, at).await
    }
}

/// Shared test harness for E2E tests.
///
/// Every adapter is in-process. The lease store and cache read time from
/// `clock`, which only moves when a test advances it or a component sleeps.
pub struct TestHarness {
    pub settings: Settings,
    pub registry: Arc<JobTypeRegistry>,
    pub clock: Arc<ManualClock>,
    pub leases: Arc<InMemoryLeaseStore>,
    pub rendezvous: Arc<InMemoryRendezvousStore>,
    pub cache: Arc<InMemoryCache>,
    pub broker: Arc<DeliveringBroker>,
}

impl TestHarness {
    /// Create a harness with default settings and a 10ms delivery delay.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let clock = Arc::new(ManualClock::default());
        let rendezvous = Arc::new(InMemoryRendezvousStore::new());
        let broker = Arc::new(DeliveringBroker::new(
            rendezvous.clone(),
            Duration::from_millis(10),
        ));

        Self {
            registry: Arc::new(JobTypeRegistry::from_settings(&settings)),
            leases: Arc::new(InMemoryLeaseStore::with_clock(clock.clone())),
            cache: Arc::new(InMemoryCache::with_clock(clock.clone())),
            clock,
            rendezvous,
            broker,
            settings,
        }
    }

    /// Register a job type in the registry.
    pub fn declare(&self, builder: JobTypeBuilder) -> Arc<JobTypeDescriptor> {
        self.registry
            .register(builder)
            .expect("Failed to register job type")
    }

    /// Dispatcher wired to the delivering broker and the harness clock.
    pub fn dispatcher(&self) -> BulkDispatcher {
        let clock: Arc<dyn Clock> = self.clock.clone();
        BulkDispatcher::with_clock(
            self.broker.clone(),
            self.rendezvous.clone(),
            clock,
            self.settings.dispatch.clone(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Job that records its arguments.
///
/// Fails when the first argument is a negative number. Takes `run_time`
/// of tokio time per run.
pub struct RecordingJob {
    descriptor: Arc<JobTypeDescriptor>,
    run_time: Duration,
    performed: Mutex<Vec<JobArgs>>,
}

impl RecordingJob {
    pub fn new(descriptor: Arc<JobTypeDescriptor>) -> Self {
        Self::with_run_time(descriptor, Duration::ZERO)
    }

    pub fn with_run_time(descriptor: Arc<JobTypeDescriptor>, run_time: Duration) -> Self {
        Self {
            descriptor,
            run_time,
            performed: Mutex::new(Vec::new()),
        }
    }

    /// Arguments of every successful run, in completion order.
    pub fn performed(&self) -> Vec<JobArgs> {
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Job for RecordingJob {
    fn descriptor(&self) -> &JobTypeDescriptor {
        &self.descriptor
    }

    async fn perform(&self, args: JobArgs) -> JobResult {
        if !self.run_time.is_zero() {
            tokio::time::sleep(self.run_time).await;
        }
        if let Some(n) = args.first().and_then(|v| v.as_i64()) {
            anyhow::ensure!(n >= 0, "negative input {n}");
        }
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args);
        Ok(())
    }
}

/// Build `[[n]]` argument lists for each value.
pub fn numbered_args(values: &[i64]) -> Vec<JobArgs> {
    values.iter().map(|v| vec![serde_json::json!(v)]).collect()
}
