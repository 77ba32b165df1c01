//! Delayed retry buffer
//!
//! Failed jobs that still have retries left are parked in a Redis sorted
//! set, scored by the epoch millisecond they become ready. Each worker
//! iteration promotes due members back onto their priority stream, which
//! gives exponential backoff without blocking the worker loop.

use crate::error::QueueError;
use crate::registry::stream_name;
use chrono::Utc;
use messaging::Job;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Envelope stored as the sorted-set member.
#[derive(Debug, Serialize, Deserialize)]
struct DelayedEnvelope {
    /// Target priority stream to re-enqueue onto
    stream: String,
    /// Serialized job payload
    job: String,
}

/// Sorted-set backed delay buffer for retries.
pub struct DelayBuffer {
    redis: Arc<ConnectionManager>,
    set_key: String,
    base_stream: String,
    max_length: i64,
}

impl DelayBuffer {
    /// Create a new DelayBuffer.
    pub fn new(
        redis: Arc<ConnectionManager>,
        set_key: impl Into<String>,
        base_stream: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            set_key: set_key.into(),
            base_stream: base_stream.into(),
            max_length: 100_000,
        }
    }

    /// Set the MAXLEN used when promoting jobs back onto a stream.
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Park a job until `delay_ms` from now.
    ///
    /// The job's priority decides which stream it returns to.
    pub async fn schedule<J: Job>(&self, job: &J, delay_ms: u64) -> Result<(), QueueError> {
        let mut conn = (*self.redis).clone();

        let envelope = DelayedEnvelope {
            stream: stream_name(&self.base_stream, job.priority()),
            job: serde_json::to_string(job)?,
        };
        let member = serde_json::to_string(&envelope)?;
        let ready_at = Utc::now().timestamp_millis() + delay_ms as i64;

        let _: i64 = conn.zadd(&self.set_key, member, ready_at).await?;

        debug!(
            job_id = %job.job_id(),
            retry_count = job.retry_count(),
            delay_ms = delay_ms,
            "Scheduled delayed retry"
        );

        Ok(())
    }

    /// Promote every due member back onto its stream.
    ///
    /// Returns the number of jobs re-enqueued.
    pub async fn promote_due(&self) -> Result<usize, QueueError> {
        let mut conn = (*self.redis).clone();
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.set_key)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        let mut promoted = 0;
        for member in &due {
            let envelope: DelayedEnvelope = match serde_json::from_str(member) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed delayed entry");
                    let _: i64 = conn.zrem(&self.set_key, member).await?;
                    continue;
                }
            };

            let _: String = redis::cmd("XADD")
                .arg(&envelope.stream)
                .arg("MAXLEN")
                .arg("~")
                .arg(self.max_length)
                .arg("*")
                .arg("job")
                .arg(&envelope.job)
                .query_async(&mut conn)
                .await?;

            // Remove only after the job is back on its stream; a crash in
            // between yields a duplicate, never a loss.
            let _: i64 = conn.zrem(&self.set_key, member).await?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!(count = promoted, "Promoted delayed jobs");
        }

        Ok(promoted)
    }

    /// Number of jobs currently parked.
    pub async fn len(&self) -> Result<i64, QueueError> {
        let mut conn = (*self.redis).clone();
        let count: i64 = conn.zcard(&self.set_key).await?;
        Ok(count)
    }

    /// Whether the buffer is empty.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Drop every parked job.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = (*self.redis).clone();
        let _: i64 = conn.del(&self.set_key).await?;
        Ok(())
    }
}
