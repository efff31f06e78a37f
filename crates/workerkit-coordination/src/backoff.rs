//! Retry backoff curves.
//!
//! Each curve is a pure function of the attempt number and a random
//! source: the same seed always yields the same delay. All arithmetic
//! saturates, so very large attempt numbers clamp instead of overflowing.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use workerkit_types::RetrySettings;

/// Attempts that use the linear curve before switching to geometric.
pub const DEFAULT_LINEAR_RETRIES: u32 = 30;

/// `uniform(1..=20) + attempt` seconds.
pub fn linear_backoff<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    let jitter: u64 = rng.gen_range(1..=20);
    Duration::from_secs(jitter.saturating_add(u64::from(attempt)))
}

/// Geometric curve for attempts past `linear_retries`.
///
/// With `k = attempt - linear_retries`: `k^4 + 15 + uniform(0..30) * (k + 1)` seconds.
pub fn geometric_backoff<R: Rng + ?Sized>(attempt: u32, linear_retries: u32, rng: &mut R) -> Duration {
    polynomial(u64::from(attempt.saturating_sub(linear_retries)), rng)
}

/// Single-curve backoff: `attempt^4 + 15 + uniform(0..30) * (attempt + 1)` seconds.
pub fn default_backoff<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    polynomial(u64::from(attempt), rng)
}

fn polynomial<R: Rng + ?Sized>(k: u64, rng: &mut R) -> Duration {
    let jitter: u64 = rng.gen_range(0..30);
    let secs = k
        .saturating_pow(4)
        .saturating_add(15)
        .saturating_add(jitter.saturating_mul(k.saturating_add(1)));
    Duration::from_secs(secs)
}

/// Linear for the first `linear_retries` attempts, geometric afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoff {
    pub linear_retries: u32,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            linear_retries: DEFAULT_LINEAR_RETRIES,
        }
    }
}

impl RetryBackoff {
    pub fn new(linear_retries: u32) -> Self {
        Self { linear_retries }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.linear_retries)
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        if attempt < self.linear_retries {
            linear_backoff(attempt, rng)
        } else {
            geometric_backoff(attempt, self.linear_retries, rng)
        }
    }

    /// Delay using the thread-local random source.
    pub fn random_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt, &mut rand::thread_rng())
    }
}
