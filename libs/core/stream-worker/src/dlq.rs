//! Dead letter queue
//!
//! Jobs that fail permanently or exhaust their retries land here as stream
//! entries carrying the payload plus failure metadata, so operators can
//! inspect and replay them.

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use messaging::Job;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// A dead-lettered job as read back from the DLQ stream.
#[derive(Debug, Clone, Serialize)]
pub struct DlqEntry {
    /// DLQ stream entry ID
    pub stream_id: String,
    /// Serialized job payload
    pub job: String,
    /// Job type name
    pub job_type: String,
    /// The error that killed the job
    pub error: String,
    /// Retry count at the time of death
    pub retry_count: u32,
    /// The priority stream the job came from
    pub source_stream: String,
    /// When the job was dead-lettered
    pub failed_at: DateTime<Utc>,
}

/// DLQ accessor bound to one queue's DLQ stream.
pub struct DlqManager {
    redis: Arc<ConnectionManager>,
    dlq_stream: String,
    max_length: i64,
}

impl DlqManager {
    /// Create a new DlqManager.
    pub fn new(redis: Arc<ConnectionManager>, dlq_stream: impl Into<String>) -> Self {
        Self {
            redis,
            dlq_stream: dlq_stream.into(),
            max_length: 10_000,
        }
    }

    /// Set the maximum DLQ length (MAXLEN ~).
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Get the DLQ stream name.
    pub fn stream_name(&self) -> &str {
        &self.dlq_stream
    }

    /// Dead-letter a job with its failure metadata.
    pub async fn push<J: Job>(
        &self,
        job: &J,
        error: &str,
        source_stream: &str,
    ) -> Result<String, QueueError> {
        let mut conn = (*self.redis).clone();

        let job_json = serde_json::to_string(job)?;
        let failed_at = Utc::now().to_rfc3339();
        let retry_count = job.retry_count().to_string();

        let stream_id: String = redis::cmd("XADD")
            .arg(&self.dlq_stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg("job")
            .arg(&job_json)
            .arg("job_type")
            .arg(job.job_type())
            .arg("error")
            .arg(error)
            .arg("retry_count")
            .arg(&retry_count)
            .arg("source_stream")
            .arg(source_stream)
            .arg("failed_at")
            .arg(&failed_at)
            .query_async(&mut conn)
            .await?;

        warn!(
            job_id = %job.job_id(),
            job_type = %job.job_type(),
            error = %error,
            retry_count = job.retry_count(),
            "Job sent to dead letter queue"
        );

        Ok(stream_id)
    }

    /// List the most recent dead-lettered jobs, newest first.
    pub async fn list(&self, count: usize) -> Result<Vec<DlqEntry>, QueueError> {
        let mut conn = (*self.redis).clone();

        let entries: Vec<(String, Vec<(String, String)>)> = redis::cmd("XREVRANGE")
            .arg(&self.dlq_stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut result = Vec::with_capacity(entries.len());
        for (stream_id, fields) in entries {
            let field = |key: &str| {
                fields
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            };

            let failed_at = field("failed_at")
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now());

            result.push(DlqEntry {
                stream_id,
                job: field("job"),
                job_type: field("job_type"),
                error: field("error"),
                retry_count: field("retry_count").parse().unwrap_or(0),
                source_stream: field("source_stream"),
                failed_at,
            });
        }

        Ok(result)
    }

    /// Number of dead-lettered jobs.
    pub async fn len(&self) -> Result<i64, QueueError> {
        let mut conn = (*self.redis).clone();
        let len: i64 = conn.xlen(&self.dlq_stream).await?;
        Ok(len)
    }

    /// Whether the DLQ is empty.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Delete the DLQ stream entirely.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = (*self.redis).clone();
        let _: i64 = conn.del(&self.dlq_stream).await?;
        Ok(())
    }
}

impl Clone for DlqManager {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            dlq_stream: self.dlq_stream.clone(),
            max_length: self.max_length,
        }
    }
}
