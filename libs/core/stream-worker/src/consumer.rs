//! Stream consumer for Redis operations
//!
//! Handles reading messages from the priority streams using consumer
//! groups. All priority streams share one consumer group name; reads list
//! the streams high to low so higher priorities drain first.

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::event::StreamEvent;
use crate::registry::stream_name;
use messaging::{Job, JobPriority};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stream consumer for Redis operations
pub struct StreamConsumer {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
    streams: Vec<String>,
}

impl StreamConsumer {
    /// Create a new StreamConsumer
    pub fn new(redis: Arc<ConnectionManager>, config: WorkerConfig) -> Self {
        let streams = JobPriority::descending()
            .iter()
            .map(|p| stream_name(&config.base_stream, *p))
            .collect();
        Self {
            redis,
            config,
            streams,
        }
    }

    /// Get a reference to the Redis connection
    pub fn redis(&self) -> Arc<ConnectionManager> {
        self.redis.clone()
    }

    /// The priority streams in drain order (highest first)
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    /// Get the consumer group
    pub fn consumer_group(&self) -> &str {
        &self.config.consumer_group
    }

    /// Get the consumer ID
    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// Initialize the consumer group on every priority stream
    pub async fn init_consumer_groups(&self) -> Result<(), QueueError> {
        let mut conn = (*self.redis).clone();

        for stream in &self.streams {
            // Try to create the group, ignore error if it already exists
            let result: RedisResult<()> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg("0") // Start from beginning
                .arg("MKSTREAM") // Create stream if it doesn't exist
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => {
                    info!(
                        stream = %stream,
                        group = %self.config.consumer_group,
                        "Created consumer group"
                    );
                }
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(
                        stream = %stream,
                        group = %self.config.consumer_group,
                        "Consumer group already exists"
                    );
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Read pending messages (messages that were delivered but not acknowledged)
    pub async fn read_pending<J: Job>(
        &self,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, QueueError> {
        let mut conn = (*self.redis).clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS");
        for stream in &self.streams {
            cmd.arg(stream);
        }
        for _ in &self.streams {
            cmd.arg("0"); // Read pending messages
        }

        let result: RedisResult<Vec<(String, Vec<(String, Vec<(String, String)>)>)>> =
            cmd.query_async(&mut conn).await;

        match result {
            Ok(streams) => self.parse_stream_response(streams),
            Err(e) if e.to_string().contains("NOGROUP") => {
                // Consumer group doesn't exist yet
                Ok(vec![])
            }
            Err(e) => Err(QueueError::Redis(e)),
        }
    }

    /// Read new messages across the priority streams
    pub async fn read_new<J: Job>(
        &self,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, QueueError> {
        let mut conn = (*self.redis).clone();

        // Build the command with optional blocking
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if let Some(timeout) = self.config.blocking_timeout_ms {
            cmd.arg("BLOCK").arg(timeout);
        }

        cmd.arg("COUNT").arg(count).arg("STREAMS");
        for stream in &self.streams {
            cmd.arg(stream);
        }
        for _ in &self.streams {
            cmd.arg(">"); // Only new messages
        }

        let result: RedisResult<Option<Vec<(String, Vec<(String, Vec<(String, String)>)>)>>> =
            cmd.query_async(&mut conn).await;

        match result {
            Ok(Some(streams)) => self.parse_stream_response(streams),
            Ok(None) => Ok(vec![]), // No messages (blocking timeout)
            Err(e) if e.to_string().contains("NOGROUP") => {
                // Consumer group doesn't exist yet
                Ok(vec![])
            }
            Err(e) => Err(QueueError::Redis(e)),
        }
    }

    /// Acknowledge a message on its stream
    pub async fn ack(&self, stream: &str, stream_id: &str) -> Result<(), QueueError> {
        let mut conn = (*self.redis).clone();

        let _: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream = %stream, stream_id = %stream_id, "Acknowledged message");
        Ok(())
    }

    /// Claim abandoned messages from other consumers
    pub async fn claim_abandoned<J: Job>(
        &self,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, QueueError> {
        let mut events = Vec::new();

        for stream in &self.streams {
            let claimed = self.claim_abandoned_on(stream, count).await?;
            events.extend(claimed);
            if events.len() >= count {
                break;
            }
        }

        Ok(events)
    }

    async fn claim_abandoned_on<J: Job>(
        &self,
        stream: &str,
        count: usize,
    ) -> Result<Vec<StreamEvent<J>>, QueueError> {
        let mut conn = (*self.redis).clone();

        // First, get pending entries info
        let pending: RedisResult<Vec<(String, String, i64, i64)>> = redis::cmd("XPENDING")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(p) => p,
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(vec![]),
            Err(e) => return Err(QueueError::Redis(e)),
        };

        if pending.is_empty() {
            return Ok(vec![]);
        }

        // Filter for messages that are old enough to claim
        let claim_ids: Vec<String> = pending
            .iter()
            .filter(|(_, _, idle_time, _)| *idle_time > self.config.claim_timeout_ms as i64)
            .map(|(id, _, _, _)| id.clone())
            .collect();

        if claim_ids.is_empty() {
            return Ok(vec![]);
        }

        // Claim the messages
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(stream)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_timeout_ms);

        for id in &claim_ids {
            cmd.arg(id);
        }

        let result: RedisResult<Vec<(String, Vec<(String, String)>)>> =
            cmd.query_async(&mut conn).await;

        match result {
            Ok(entries) => {
                let events = self.parse_entries(stream, entries)?;
                if !events.is_empty() {
                    warn!(
                        stream = %stream,
                        count = events.len(),
                        "Claimed abandoned messages"
                    );
                }
                Ok(events)
            }
            Err(e) => Err(QueueError::Redis(e)),
        }
    }

    /// Aggregate queue info over the priority streams and the DLQ
    pub async fn stream_info(&self) -> Result<StreamInfo, QueueError> {
        let mut conn = (*self.redis).clone();

        let mut streams = Vec::with_capacity(self.streams.len());
        let mut total_length = 0i64;
        let mut total_pending = 0i64;

        for stream in &self.streams {
            let length: i64 = conn.xlen(stream).await.unwrap_or(0);

            // Summary form of XPENDING; errors mean no group yet
            let pending: RedisResult<(
                i64,
                Option<String>,
                Option<String>,
                Option<Vec<(String, i64)>>,
            )> = redis::cmd("XPENDING")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await;

            let pending_count = pending.map(|(count, _, _, _)| count).unwrap_or(0);

            total_length += length;
            total_pending += pending_count;
            streams.push(StreamDepth {
                stream: stream.clone(),
                length,
                pending_count,
            });
        }

        let dlq_length: i64 = conn.xlen(&self.config.dlq_stream).await.unwrap_or(0);
        let delayed_count: i64 = conn.zcard(&self.config.delayed_set).await.unwrap_or(0);

        Ok(StreamInfo {
            base_stream: self.config.base_stream.clone(),
            consumer_group: self.config.consumer_group.clone(),
            streams,
            total_length,
            total_pending,
            delayed_count,
            dlq_length,
        })
    }

    /// Parse stream response from XREADGROUP
    fn parse_stream_response<J: Job>(
        &self,
        streams: Vec<(String, Vec<(String, Vec<(String, String)>)>)>,
    ) -> Result<Vec<StreamEvent<J>>, QueueError> {
        let mut events = Vec::new();

        for (stream, entries) in streams {
            let parsed = self.parse_entries(&stream, entries)?;
            events.extend(parsed);
        }

        Ok(events)
    }

    /// Parse entries from Redis response
    fn parse_entries<J: Job>(
        &self,
        stream: &str,
        entries: Vec<(String, Vec<(String, String)>)>,
    ) -> Result<Vec<StreamEvent<J>>, QueueError> {
        let mut events = Vec::new();

        for (stream_id, fields) in entries {
            // Find the "job" field (main stream format)
            let job_data = fields
                .iter()
                .find(|(k, _)| k == "job")
                .map(|(_, v)| v.as_str());

            if let Some(json) = job_data {
                match serde_json::from_str::<J>(json) {
                    Ok(job) => {
                        events.push(StreamEvent::new(stream.to_string(), stream_id, job));
                    }
                    Err(e) => {
                        warn!(
                            stream = %stream,
                            stream_id = %stream_id,
                            error = %e,
                            "Failed to parse job, skipping"
                        );
                    }
                }
            } else {
                warn!(
                    stream = %stream,
                    stream_id = %stream_id,
                    fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                    "Missing 'job' field in message"
                );
            }
        }

        Ok(events)
    }
}

/// Per-stream depth
#[derive(Debug, Clone, Serialize)]
pub struct StreamDepth {
    pub stream: String,
    pub length: i64,
    pub pending_count: i64,
}

/// Queue information aggregated over the priority streams
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub base_stream: String,
    pub consumer_group: String,
    pub streams: Vec<StreamDepth>,
    pub total_length: i64,
    pub total_pending: i64,
    pub delayed_count: i64,
    pub dlq_length: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_info_totals() {
        let info = StreamInfo {
            base_stream: "test:jobs".to_string(),
            consumer_group: "test_workers".to_string(),
            streams: vec![
                StreamDepth {
                    stream: "test:jobs:high".to_string(),
                    length: 10,
                    pending_count: 2,
                },
                StreamDepth {
                    stream: "test:jobs:normal".to_string(),
                    length: 90,
                    pending_count: 3,
                },
            ],
            total_length: 100,
            total_pending: 5,
            delayed_count: 1,
            dlq_length: 0,
        };

        assert_eq!(info.total_length, 100);
        assert_eq!(info.total_pending, 5);
        assert_eq!(info.streams.len(), 2);
    }
}
