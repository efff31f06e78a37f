//! Error types for adapter operations.

use thiserror::Error;

/// Errors that can occur while talking to an external collaborator.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Backend could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed the operation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Referenced key does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdapterError {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// `now + duration`, failing instead of overflowing the timestamp range.
pub(crate) fn deadline_after(
    now: chrono::DateTime<chrono::Utc>,
    duration: std::time::Duration,
) -> Result<chrono::DateTime<chrono::Utc>, AdapterError> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| AdapterError::backend(format!("duration out of range: {duration:?}")))
}
