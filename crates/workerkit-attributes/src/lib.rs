//! Per-job-type attributes for workerkit.
//!
//! A job type is declared once, at process start, through a
//! [`JobTypeBuilder`]. Building validates every attribute combination and
//! yields an immutable [`JobTypeDescriptor`] that is stored in the
//! [`JobTypeRegistry`]. Dispatch and coordination code only ever read
//! descriptors.
//!
//! # Example
//!
//! ```
//! use workerkit_attributes::{DataConsistency, JobTypeBuilder, JobTypeRegistry, Urgency};
//!
//! let registry = JobTypeRegistry::default();
//! let descriptor = registry
//!     .register(
//!         JobTypeBuilder::new("App::Projects::ExportWorker")
//!             .queue_namespace("project_export")
//!             .urgency(Urgency::High)
//!             .data_consistency(DataConsistency::Always, None)?
//!             .idempotent()?,
//!     )?;
//!
//! assert_eq!(descriptor.queue_name(), "project_export:projects_export");
//! # Ok::<(), workerkit_attributes::AttributeError>(())
//! ```

mod attributes;
mod definition;
mod descriptor;
mod error;
mod flags;
mod naming;
mod registry;

pub use attributes::{DataConsistency, FeatureCategory, ResourceBoundary, Urgency};
pub use definition::{parse_definitions, DeduplicationDefinition, JobTypeDefinition};
pub use descriptor::{JobTypeBuilder, JobTypeDescriptor, DEFAULT_DEDUPLICATION_STRATEGY};
pub use error::AttributeError;
pub use flags::FeatureFlags;
pub use naming::{underscore, QueueNaming, WORKER_SUFFIX};
pub use registry::JobTypeRegistry;
