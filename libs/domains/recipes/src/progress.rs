//! Progress tracking port and the Redis adapter.
//!
//! Counters are persisted as one JSON blob so a fresh invocation (or a
//! dashboard poll) sees the same aggregate state the workers update.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::IndexResult;
use crate::models::QueueStats;

/// Redis key holding the serialized [`QueueStats`].
const PROGRESS_KEY: &str = "recipes:embed:progress";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the current counters; defaults when none are stored yet.
    async fn load(&self) -> IndexResult<QueueStats>;

    async fn save(&self, stats: &QueueStats) -> IndexResult<()>;

    /// Drop all stored counters.
    async fn reset(&self) -> IndexResult<()>;
}

pub struct RedisProgressStore {
    redis: ConnectionManager,
    key: String,
}

impl RedisProgressStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            key: PROGRESS_KEY.to_string(),
        }
    }

    pub fn with_key(redis: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
        }
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn load(&self) -> IndexResult<QueueStats> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(&self.key).await?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(QueueStats::default()),
        }
    }

    async fn save(&self, stats: &QueueStats) -> IndexResult<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(stats)?;
        let _: () = conn.set(&self.key, json).await?;
        Ok(())
    }

    async fn reset(&self) -> IndexResult<()> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(&self.key).await?;
        debug!(key = %self.key, "Progress counters reset");
        Ok(())
    }
}

/// In-memory store for tests and local runs without Redis.
#[derive(Default)]
pub struct InMemoryProgressStore {
    stats: tokio::sync::Mutex<Option<QueueStats>>,
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn load(&self) -> IndexResult<QueueStats> {
        Ok(self.stats.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, stats: &QueueStats) -> IndexResult<()> {
        *self.stats.lock().await = Some(stats.clone());
        Ok(())
    }

    async fn reset(&self) -> IndexResult<()> {
        *self.stats.lock().await = None;
        Ok(())
    }
}
