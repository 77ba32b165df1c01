//! Domain models for the recipe embedding pipeline.

use chrono::{DateTime, Utc};
use messaging::{Job, JobPriority};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Opaque unique key identifying one recipe record.
///
/// The raw id is whatever the record store uses; the vector index point id
/// is derived deterministically from it so upserts for the same recipe
/// always land on the same point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct RecipeId(pub String);

impl RecipeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic vector point id for this recipe.
    ///
    /// UUIDv5 over the raw id, so re-embedding the same recipe replaces
    /// its point instead of creating a second one.
    pub fn point_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, self.0.as_bytes())
    }
}

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecipeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecipeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canonical normalized recipe shape.
///
/// The record source adapter flattens whatever the store returns
/// (compressed or plain, wrapped or not, ingredients as strings or
/// objects) into this; downstream code never sees raw payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub recipe_yield: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub total_time: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub url: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

/// One page of record keys from the record source.
#[derive(Debug, Clone, Default)]
pub struct RecipePage {
    pub ids: Vec<RecipeId>,
    pub next_cursor: Option<String>,
}

/// An entry to upsert into the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: RecipeId,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// A similarity match returned by the vector index.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: RecipeId,
    pub score: f32,
}

/// A queued embedding job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedJob {
    pub recipe_id: RecipeId,
    #[serde(default)]
    pub priority: JobPriority,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    /// Re-embed even if the recipe already has a vector.
    #[serde(default)]
    pub force: bool,
}

impl EmbedJob {
    pub fn new(recipe_id: RecipeId) -> Self {
        Self {
            recipe_id,
            priority: JobPriority::Normal,
            enqueued_at: Utc::now(),
            retry_count: 0,
            force: false,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Job for EmbedJob {
    fn job_id(&self) -> String {
        self.recipe_id.0.clone()
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    fn priority(&self) -> JobPriority {
        self.priority
    }

    fn job_type(&self) -> &'static str {
        "embed_recipe"
    }
}

/// Why a record was skipped or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    NoData,
    NoText,
    AlreadyHasEmbedding,
    EmbeddingFailed,
    VectorStoreError,
}

impl OutcomeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeReason::NoData => "no_data",
            OutcomeReason::NoText => "no_text",
            OutcomeReason::AlreadyHasEmbedding => "already_has_embedding",
            OutcomeReason::EmbeddingFailed => "embedding_failed",
            OutcomeReason::VectorStoreError => "vector_store_error",
        }
    }
}

/// Terminal status of one record in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Processed,
    Skipped,
    Error,
}

/// Per-record outcome log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordOutcome {
    pub recipe_id: RecipeId,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<OutcomeReason>,
}

impl RecordOutcome {
    pub fn processed(id: RecipeId) -> Self {
        Self {
            recipe_id: id,
            status: OutcomeStatus::Processed,
            reason: None,
        }
    }

    pub fn skipped(id: RecipeId, reason: OutcomeReason) -> Self {
        Self {
            recipe_id: id,
            status: OutcomeStatus::Skipped,
            reason: Some(reason),
        }
    }

    pub fn error(id: RecipeId, reason: OutcomeReason) -> Self {
        Self {
            recipe_id: id,
            status: OutcomeStatus::Error,
            reason: Some(reason),
        }
    }
}

/// Aggregate result of one batch pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BatchReport {
    pub processed: u32,
    pub skipped: u32,
    pub errors: u32,
    pub details: Vec<RecordOutcome>,
    pub calls_used: u32,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn record(&mut self, outcome: RecordOutcome) {
        match outcome.status {
            OutcomeStatus::Processed => self.processed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Error => self.errors += 1,
        }
        self.details.push(outcome);
    }
}

/// Aggregate queue counters, persisted as JSON.
///
/// Invariant: `completed + failed + skipped <= total`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_updated_at: DateTime<Utc>,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            total: 0,
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            skipped: 0,
            last_updated_at: Utc::now(),
        }
    }
}

/// Derived progress status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Idle,
    Processing,
    Running,
    Stale,
}

/// Pending work is considered stale after this long without an update.
pub const STALE_AFTER_MINUTES: i64 = 10;

impl QueueStats {
    /// Register newly enqueued work.
    pub fn record_enqueued(&mut self, count: u64) {
        self.total += count;
        self.pending += count;
        self.touch();
    }

    /// Move jobs from pending into processing.
    pub fn record_started(&mut self, count: u64) {
        let moved = count.min(self.pending);
        self.pending -= moved;
        self.processing += moved;
        self.touch();
    }

    pub fn record_completed(&mut self, count: u64) {
        self.processing = self.processing.saturating_sub(count);
        self.completed += count;
        self.touch();
    }

    /// Return jobs from processing to pending ahead of a redelivery.
    pub fn record_retried(&mut self, count: u64) {
        let moved = count.min(self.processing);
        self.processing -= moved;
        self.pending += moved;
        self.touch();
    }

    pub fn record_failed(&mut self, count: u64) {
        self.processing = self.processing.saturating_sub(count);
        self.failed += count;
        self.touch();
    }

    pub fn record_skipped(&mut self, count: u64) {
        self.processing = self.processing.saturating_sub(count);
        self.skipped += count;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }

    /// Fraction of total work that has reached a terminal state.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        ((self.completed + self.skipped) as f64 / self.total as f64) * 100.0
    }

    /// Derived status relative to `now`.
    pub fn status(&self, now: DateTime<Utc>) -> ProgressStatus {
        if self.processing > 0 {
            return ProgressStatus::Processing;
        }
        if self.pending > 0 {
            let age = now - self.last_updated_at;
            if age > chrono::Duration::minutes(STALE_AFTER_MINUTES) {
                return ProgressStatus::Stale;
            }
            return ProgressStatus::Running;
        }
        ProgressStatus::Idle
    }

    /// Check the counter invariant.
    pub fn is_consistent(&self) -> bool {
        self.completed + self.failed + self.skipped <= self.total
    }
}
