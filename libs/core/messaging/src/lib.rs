//! Common messaging abstractions for durable job queues.
//!
//! This library provides backend-agnostic traits and types used by the
//! Redis Streams backend in `stream-worker`:
//!
//! - [`Job`]: a serializable unit of work with identity, priority, and a
//!   retry counter
//! - [`Processor`]: the handler that executes a job
//! - [`ProcessingError`] / [`ErrorCategory`]: categorized failures that
//!   drive the retry-or-dead-letter decision and the backoff schedule
//!
//! # Example
//!
//! ```ignore
//! use messaging::{Job, JobPriority, Processor, ProcessingError};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct EmbedJob {
//!     recipe_id: String,
//!     priority: JobPriority,
//!     retry_count: u32,
//! }
//!
//! impl Job for EmbedJob {
//!     fn job_id(&self) -> String { self.recipe_id.clone() }
//!     fn retry_count(&self) -> u32 { self.retry_count }
//!     fn with_retry(&self) -> Self { Self { retry_count: self.retry_count + 1, ..self.clone() } }
//!     fn priority(&self) -> JobPriority { self.priority }
//! }
//! ```

mod error;
mod job;
mod processor;

pub use error::{ErrorCategory, ProcessingError};
pub use job::{Job, JobPriority};
pub use processor::{FailingProcessor, NoOpProcessor, Processor};
