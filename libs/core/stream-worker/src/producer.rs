//! Stream producer for job enqueuing
//!
//! Generic producer that can be used by any service to queue jobs for
//! background processing. Jobs land on the priority stream matching their
//! [`messaging::JobPriority`].
//!
//! # Example
//!
//! ```rust,ignore
//! use stream_worker::{QueueDef, StreamProducer};
//!
//! let producer = StreamProducer::from_queue_def::<EmbedQueue>(redis);
//!
//! let job = EmbedJob::new(recipe_id);
//! let message_id = producer.send(&job).await?;
//! ```

use crate::error::QueueError;
use crate::registry::{QueueDef, stream_name};
use messaging::Job;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::debug;

/// Maximum jobs per pipeline round trip in [`StreamProducer::send_batch`].
pub const PIPELINE_CHUNK_SIZE: usize = 100;

/// Generic stream producer for enqueuing jobs.
///
/// This producer can be used by any service (API, CLI, scheduler) to
/// queue jobs for background processing by workers.
pub struct StreamProducer {
    redis: Arc<ConnectionManager>,
    base_stream: String,
    max_length: i64,
}

impl StreamProducer {
    /// Create a new StreamProducer for a base stream name.
    pub fn new(redis: ConnectionManager, base_stream: impl Into<String>) -> Self {
        Self {
            redis: Arc::new(redis),
            base_stream: base_stream.into(),
            max_length: 100_000,
        }
    }

    /// Create a producer from a `QueueDef` implementation.
    ///
    /// This is the recommended way to create a producer as it ensures
    /// the stream names and max length are consistent with the worker.
    pub fn from_queue_def<Q: QueueDef>(redis: ConnectionManager) -> Self {
        Self {
            redis: Arc::new(redis),
            base_stream: Q::BASE_STREAM.to_string(),
            max_length: Q::MAX_LENGTH,
        }
    }

    /// Create from an Arc<ConnectionManager> (for sharing connections).
    pub fn from_arc(redis: Arc<ConnectionManager>, base_stream: impl Into<String>) -> Self {
        Self {
            redis,
            base_stream: base_stream.into(),
            max_length: 100_000,
        }
    }

    /// Set the maximum stream length (MAXLEN ~).
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Get the base stream name.
    pub fn base_stream(&self) -> &str {
        &self.base_stream
    }

    /// Enqueue a job on the priority stream matching its priority.
    ///
    /// Returns the Redis stream message ID.
    pub async fn send<J: Job>(&self, job: &J) -> Result<String, QueueError> {
        let stream = stream_name(&self.base_stream, job.priority());
        let mut conn = (*self.redis).clone();

        let job_json = serde_json::to_string(job)?;

        // XADD with MAXLEN ~ for approximate trimming (more efficient)
        let stream_id: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg("job") // Field name matches what StreamConsumer expects
            .arg(&job_json)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %stream,
            stream_id = %stream_id,
            job_id = %job.job_id(),
            "Enqueued job"
        );

        Ok(stream_id)
    }

    /// Enqueue multiple jobs in pipelined batches.
    ///
    /// Jobs are grouped onto their priority streams, at most
    /// [`PIPELINE_CHUNK_SIZE`] per pipeline round trip so a large populate
    /// pass never builds one unbounded pipeline.
    pub async fn send_batch<J: Job>(&self, jobs: &[J]) -> Result<Vec<String>, QueueError> {
        if jobs.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = (*self.redis).clone();
        let mut results = Vec::with_capacity(jobs.len());

        for chunk in jobs.chunks(PIPELINE_CHUNK_SIZE) {
            let mut pipe = redis::pipe();

            for job in chunk {
                let stream = stream_name(&self.base_stream, job.priority());
                let job_json = serde_json::to_string(job)?;
                pipe.cmd("XADD")
                    .arg(&stream)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(self.max_length)
                    .arg("*")
                    .arg("job")
                    .arg(&job_json);
            }

            let ids: Vec<String> = pipe.query_async(&mut conn).await?;
            results.extend(ids);
        }

        debug!(
            base_stream = %self.base_stream,
            count = results.len(),
            "Enqueued batch of jobs"
        );

        Ok(results)
    }

    /// Get the total length across all priority streams.
    pub async fn queue_length(&self) -> Result<i64, QueueError> {
        let mut conn = (*self.redis).clone();
        let mut total = 0i64;

        for priority in messaging::JobPriority::descending() {
            let stream = stream_name(&self.base_stream, priority);
            let len: i64 = conn.xlen(&stream).await.unwrap_or(0);
            total += len;
        }

        Ok(total)
    }
}

impl Clone for StreamProducer {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            base_stream: self.base_stream.clone(),
            max_length: self.max_length,
        }
    }
}
