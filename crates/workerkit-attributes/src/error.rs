//! Error types for job-type attribute declaration.
//!
//! Every variant is a configuration error: it is raised while job types
//! are being declared, never while jobs run.

use thiserror::Error;

/// Errors raised while declaring or looking up job types.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// Value outside the allowed set for an attribute
    #[error("Invalid {attribute}: {value}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },

    /// Set-once attribute configured twice on the same type
    #[error("Data consistency is already set for {0}")]
    AlreadySet(String),

    /// Idempotent job types must always read from the primary
    #[error("{0} can't be marked as idempotent if data_consistency is not set to always")]
    InvalidCombination(String),

    /// A type with this name is already registered
    #[error("Job type already registered: {0}")]
    AlreadyRegistered(String),

    /// No type with this name is registered
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// Type name cannot produce a queue name
    #[error("Invalid job type name: {0}")]
    InvalidTypeName(String),

    /// Declarative definitions could not be parsed
    #[error("Definition error: {0}")]
    Definition(String),
}

impl AttributeError {
    pub(crate) fn invalid(attribute: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute,
            value: value.into(),
        }
    }
}
