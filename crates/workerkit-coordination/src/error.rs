//! Error types for the coordination crate.
//!
//! Lease contention and rendezvous timeouts are not errors; they come back
//! as outcome values. Only adapter failures, configuration mistakes and
//! bad schedules surface here.

use chrono::{DateTime, Utc};
use thiserror::Error;

use workerkit_adapters::AdapterError;
use workerkit_attributes::AttributeError;

/// Errors that can occur during coordination operations.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// An external collaborator failed
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Job type configuration is invalid
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// Scheduled time is not strictly in the future
    #[error("Scheduled time {scheduled_at} is not after {now}")]
    InvalidSchedule {
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Batch schedule has a zero size or delay, or lands outside the timestamp range
    #[error("Invalid batch schedule: {0}")]
    InvalidBatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let now = Utc::now();
        let err = CoordinationError::InvalidSchedule {
            scheduled_at: now,
            now,
        };
        assert!(err.to_string().contains("is not after"));

        let err = CoordinationError::InvalidBatch("size must be positive".to_string());
        assert!(err.to_string().contains("Invalid batch schedule"));

        let err: CoordinationError = AdapterError::backend("boom").into();
        assert_eq!(err.to_string(), "Backend error: boom");

        let err: CoordinationError = AttributeError::UnknownJobType("App::X".to_string()).into();
        assert!(matches!(err, CoordinationError::Attribute(_)));
    }
}
