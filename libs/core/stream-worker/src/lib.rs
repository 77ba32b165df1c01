//! Redis Streams queue backend.
//!
//! Implements the `messaging` traits on top of Redis Streams with:
//!
//! - **Priority streams**: one stream per [`messaging::JobPriority`], drained
//!   high to low; FIFO within a stream
//! - **Consumer groups** with explicit acknowledgement; every delivered
//!   message is acked exactly once regardless of outcome
//! - **Delayed retry**: failed jobs are parked in a sorted set scored by
//!   their ready-at time and promoted back onto their stream, giving
//!   exponential backoff without blocking the worker
//! - **Dead letter queue** for jobs that exhaust their retries
//! - **Abandoned message recovery** via XPENDING/XCLAIM
//! - **Prometheus metrics** and health/readiness endpoints
//!
//! # Example
//!
//! ```ignore
//! use stream_worker::{QueueDef, StreamWorker, WorkerConfig};
//!
//! struct EmbedQueue;
//!
//! impl QueueDef for EmbedQueue {
//!     const BASE_STREAM: &'static str = "recipes:embed";
//!     const CONSUMER_GROUP: &'static str = "embed_workers";
//!     const DLQ_STREAM: &'static str = "recipes:embed:dlq";
//! }
//!
//! let config = WorkerConfig::from_queue_def::<EmbedQueue>();
//! let worker = StreamWorker::new(redis, processor, config);
//! worker.run(shutdown_rx).await?;
//! ```

pub mod config;
pub mod consumer;
pub mod delay;
pub mod dlq;
pub mod error;
pub mod event;
pub mod health;
pub mod metrics;
pub mod producer;
pub mod registry;
pub mod worker;

pub use config::WorkerConfig;
pub use consumer::{StreamConsumer, StreamInfo};
pub use delay::DelayBuffer;
pub use dlq::{DlqEntry, DlqManager};
pub use error::QueueError;
pub use event::StreamEvent;
pub use health::{HealthState, worker_router};
pub use producer::StreamProducer;
pub use registry::QueueDef;
pub use worker::StreamWorker;
