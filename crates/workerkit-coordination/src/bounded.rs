//! Time-bounded work loops.
//!
//! [`run_bounded`] keeps calling a body until the body reports there is no
//! work left or a wall-clock budget runs out, whichever comes first. The
//! number of iterations is not fixed in advance.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use workerkit_adapters::{elapsed_since, millis, Clock};

/// Tracks a runtime budget that started when the limiter was created.
#[derive(Clone)]
pub struct RuntimeLimiter {
    clock: Arc<dyn Clock>,
    start: DateTime<Utc>,
    limit: Duration,
    exceeded: Arc<AtomicBool>,
}

impl RuntimeLimiter {
    pub fn new(clock: Arc<dyn Clock>, limit: Duration) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            limit,
            exceeded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        elapsed_since(self.clock.as_ref(), self.start)
    }

    /// Check the budget now. Once over, stays over.
    pub fn over_time(&self) -> bool {
        if self.elapsed() >= self.limit {
            self.exceeded.store(true, Ordering::SeqCst);
        }
        self.exceeded.load(Ordering::SeqCst)
    }

    /// Result of the most recent `over_time` check, without reading the clock.
    pub fn was_over_time(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }
}

/// Why a bounded loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStop {
    /// The body reported no more work.
    Exhausted,

    /// The runtime budget ran out.
    OverTime,
}

/// Result of [`run_bounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundedLoopOutcome {
    pub iterations: u64,
    pub stop: LoopStop,
}

impl BoundedLoopOutcome {
    pub fn over_time(&self) -> bool {
        self.stop == LoopStop::OverTime
    }
}

/// Call `body` until it breaks or `limit` has elapsed.
///
/// The body receives the limiter so it can check `over_time` between its
/// own work items. A body that already saw the budget run out leaves the
/// limiter marked, and the loop stops before the next call. The first
/// call always happens, even with a zero limit.
pub async fn run_bounded<F, Fut>(clock: Arc<dyn Clock>, limit: Duration, mut body: F) -> BoundedLoopOutcome
where
    F: FnMut(RuntimeLimiter) -> Fut,
    Fut: Future<Output = ControlFlow<()>>,
{
    let limiter = RuntimeLimiter::new(clock, limit);
    let mut iterations = 0;

    let stop = loop {
        if limiter.was_over_time() {
            break LoopStop::OverTime;
        }

        let flow = body(limiter.clone()).await;
        iterations += 1;

        if flow.is_break() {
            break LoopStop::Exhausted;
        }
        if limiter.over_time() {
            break LoopStop::OverTime;
        }
    };

    debug!(
        iterations,
        elapsed_ms = millis(limiter.elapsed()),
        over_time = stop == LoopStop::OverTime,
        "Bounded loop finished"
    );
    BoundedLoopOutcome { iterations, stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use workerkit_adapters::ManualClock;

    #[tokio::test]
    async fn test_stops_when_exhausted() {
        let clock = Arc::new(ManualClock::default());
        let mut remaining = 3;

        let outcome = run_bounded(clock, Duration::from_secs(60), |_| {
            remaining -= 1;
            let flow = if remaining == 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            };
            async move { flow }
        })
        .await;

        assert_eq!(
            outcome,
            BoundedLoopOutcome {
                iterations: 3,
                stop: LoopStop::Exhausted
            }
        );
    }

    #[tokio::test]
    async fn test_stops_when_over_time() {
        let clock = Arc::new(ManualClock::default());
        let body_clock = clock.clone();

        let outcome = run_bounded(clock, Duration::from_secs(3), |_| {
            body_clock.advance(Duration::from_secs(1));
            async { ControlFlow::Continue(()) }
        })
        .await;

        assert_eq!(outcome.iterations, 3);
        assert!(outcome.over_time());
    }

    #[tokio::test]
    async fn test_body_detected_overrun_stops_loop() {
        let clock = Arc::new(ManualClock::default());
        let body_clock = clock.clone();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();

        let outcome = run_bounded(clock, Duration::from_secs(10), |limiter| {
            counter.fetch_add(1, Ordering::SeqCst);
            body_clock.advance(Duration::from_secs(11));
            let over = limiter.over_time();
            async move {
                assert!(over);
                ControlFlow::Continue(())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.stop, LoopStop::OverTime);
    }

    #[tokio::test]
    async fn test_zero_limit_runs_once() {
        let clock = Arc::new(ManualClock::default());
        let outcome = run_bounded(clock, Duration::ZERO, |_| async { ControlFlow::Continue(()) }).await;
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.stop, LoopStop::OverTime);
    }

    #[test]
    fn test_limiter_caches_result() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RuntimeLimiter::new(clock.clone(), Duration::from_secs(5));

        assert!(!limiter.over_time());
        clock.advance(Duration::from_secs(6));
        assert!(!limiter.was_over_time());
        assert!(limiter.over_time());
        assert!(limiter.was_over_time());
    }
}
