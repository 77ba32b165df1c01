//! Worker configuration.

use crate::registry::QueueDef;
use uuid::Uuid;

/// Configuration for the stream worker and its consumer.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base stream name; priority streams are `{base}:{priority}`.
    pub base_stream: String,

    /// Consumer group name shared by all priority streams.
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided).
    pub consumer_id: String,

    /// Dead letter queue stream name.
    pub dlq_stream: String,

    /// Sorted-set key for delayed retries.
    pub delayed_set: String,

    /// Maximum stream length before trimming.
    pub max_length: i64,

    /// Poll interval in milliseconds when no messages are available.
    pub poll_interval_ms: u64,

    /// Batch size for reading messages.
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds (None = non-blocking).
    pub blocking_timeout_ms: Option<u64>,

    /// Claim timeout in milliseconds for abandoned messages.
    pub claim_timeout_ms: u64,

    /// Maximum delivery attempts before a job is dead-lettered.
    pub max_retries: u32,

    /// Whether failed jobs go to the DLQ (disable only in tests).
    pub enable_dlq: bool,
}

impl WorkerConfig {
    /// Create a WorkerConfig from a QueueDef.
    pub fn from_queue_def<Q: QueueDef>() -> Self {
        Self {
            base_stream: Q::BASE_STREAM.to_string(),
            consumer_group: Q::CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream: Q::DLQ_STREAM.to_string(),
            delayed_set: Q::delayed_set(),
            max_length: Q::MAX_LENGTH,
            poll_interval_ms: 1000,
            batch_size: 10,
            blocking_timeout_ms: Some(5000),
            claim_timeout_ms: 30_000,
            max_retries: 3,
            enable_dlq: true,
        }
    }

    /// Create a WorkerConfig with explicit values.
    pub fn new(base_stream: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        let base = base_stream.into();
        Self {
            dlq_stream: format!("{}:dlq", base),
            delayed_set: format!("{}:delayed", base),
            base_stream: base,
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            max_length: 100_000,
            poll_interval_ms: 1000,
            batch_size: 10,
            blocking_timeout_ms: Some(5000),
            claim_timeout_ms: 30_000,
            max_retries: 3,
            enable_dlq: true,
        }
    }

    /// Set the consumer ID.
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the DLQ stream name.
    pub fn with_dlq_stream(mut self, stream: impl Into<String>) -> Self {
        self.dlq_stream = stream.into();
        self
    }

    /// Set the maximum stream length.
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the blocking timeout (None for non-blocking).
    pub fn with_blocking(mut self, timeout_ms: Option<u64>) -> Self {
        self.blocking_timeout_ms = timeout_ms;
        self
    }

    /// Set the claim timeout for abandoned messages.
    pub fn with_claim_timeout_ms(mut self, timeout: u64) -> Self {
        self.claim_timeout_ms = timeout;
        self
    }

    /// Set the maximum delivery attempts.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enable or disable the DLQ.
    pub fn with_dlq(mut self, enable: bool) -> Self {
        self.enable_dlq = enable;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("stream:jobs", "workers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestQueue;

    impl QueueDef for TestQueue {
        const BASE_STREAM: &'static str = "test:jobs";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DLQ_STREAM: &'static str = "test:jobs:dlq";
    }

    #[test]
    fn test_from_queue_def() {
        let config = WorkerConfig::from_queue_def::<TestQueue>();

        assert_eq!(config.base_stream, "test:jobs");
        assert_eq!(config.consumer_group, "test_workers");
        assert_eq!(config.dlq_stream, "test:jobs:dlq");
        assert_eq!(config.delayed_set, "test:jobs:delayed");
        assert_eq!(config.max_retries, 3);
        assert!(config.consumer_id.starts_with("worker-"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = WorkerConfig::new("my:jobs", "my_group")
            .with_consumer_id("worker-1")
            .with_batch_size(20)
            .with_blocking(Some(10_000))
            .with_max_retries(5);

        assert_eq!(config.base_stream, "my:jobs");
        assert_eq!(config.dlq_stream, "my:jobs:dlq");
        assert_eq!(config.consumer_id, "worker-1");
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.blocking_timeout_ms, Some(10_000));
        assert_eq!(config.max_retries, 5);
    }
}
