//! Queue definitions.
//!
//! Each domain implements [`QueueDef`] to name its streams. A queue is a
//! family of Redis streams, one per priority level, plus a DLQ stream and
//! a delayed-retry sorted set derived from the base name.

use messaging::JobPriority;

/// Queue definition trait.
///
/// # Example
///
/// ```rust,ignore
/// use stream_worker::QueueDef;
///
/// pub struct EmbedQueue;
///
/// impl QueueDef for EmbedQueue {
///     const BASE_STREAM: &'static str = "recipes:embed";
///     const CONSUMER_GROUP: &'static str = "embed_workers";
///     const DLQ_STREAM: &'static str = "recipes:embed:dlq";
/// }
/// ```
pub trait QueueDef: Send + Sync {
    /// Base stream name; priority streams are `{base}:{priority}`.
    const BASE_STREAM: &'static str;

    /// The consumer group name shared by all priority streams.
    const CONSUMER_GROUP: &'static str;

    /// The dead letter queue stream name for failed jobs.
    const DLQ_STREAM: &'static str;

    /// Maximum stream length before auto-trim (MAXLEN).
    /// Default: 100,000 entries.
    const MAX_LENGTH: i64 = 100_000;

    /// Stream name for a given priority.
    fn stream_for(priority: JobPriority) -> String {
        stream_name(Self::BASE_STREAM, priority)
    }

    /// Sorted-set key holding delayed retries for this queue.
    fn delayed_set() -> String {
        format!("{}:delayed", Self::BASE_STREAM)
    }

    /// All priority streams, drain order (highest first).
    fn all_streams() -> Vec<String> {
        JobPriority::descending()
            .iter()
            .map(|p| Self::stream_for(*p))
            .collect()
    }
}

/// Stream name for a base name and priority.
pub fn stream_name(base: &str, priority: JobPriority) -> String {
    format!("{}:{}", base, priority.as_str())
}
