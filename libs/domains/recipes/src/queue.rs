//! Embedding queue definition and the stream job processor.

use std::sync::Arc;

use async_trait::async_trait;
use messaging::{Job, ProcessingError, Processor};
use stream_worker::QueueDef;
use tracing::{info, warn};

use crate::budget::CallBudget;
use crate::error::IndexError;
use crate::models::{EmbedJob, OutcomeStatus, QueueStats};
use crate::processor::BatchProcessor;
use crate::progress::ProgressStore;

/// Stream layout for embedding jobs.
pub struct EmbedQueue;

impl QueueDef for EmbedQueue {
    const BASE_STREAM: &'static str = "recipes:embed";
    const CONSUMER_GROUP: &'static str = "embed_workers";
    const DLQ_STREAM: &'static str = "recipes:embed:dlq";
}

/// Processes one [`EmbedJob`] per delivery.
///
/// Skips (missing record, empty text, already embedded) complete the job
/// successfully; only embedding and vector-store failures surface as
/// retryable errors.
pub struct EmbedJobProcessor {
    batch: Arc<BatchProcessor>,
    progress: Arc<dyn ProgressStore>,
}

impl EmbedJobProcessor {
    pub fn new(batch: Arc<BatchProcessor>, progress: Arc<dyn ProgressStore>) -> Self {
        Self { batch, progress }
    }

    async fn update_progress(&self, apply: impl FnOnce(&mut QueueStats)) {
        let mut stats = match self.progress.load().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Failed to load progress counters");
                return;
            }
        };
        apply(&mut stats);
        if let Err(e) = self.progress.save(&stats).await {
            warn!(error = %e, "Failed to save progress counters");
        }
    }

    /// Count a failed attempt.
    ///
    /// A retryable failure is redelivered, so the job goes back to pending
    /// and only the terminal attempt increments `failed`. Keeps
    /// `completed + failed + skipped <= total` across redeliveries.
    async fn record_failure(&self, job: &EmbedJob, err: &ProcessingError) {
        if err.should_retry(job.retry_count()) {
            self.update_progress(|stats| stats.record_retried(1)).await;
        } else {
            self.update_progress(|stats| stats.record_failed(1)).await;
        }
    }
}

#[async_trait]
impl Processor<EmbedJob> for EmbedJobProcessor {
    async fn process(&self, job: &EmbedJob) -> Result<(), ProcessingError> {
        self.update_progress(|stats| stats.record_started(1)).await;

        let mut budget = CallBudget::default();
        let outcome = self
            .batch
            .process_one(&job.recipe_id, &mut budget, job.force)
            .await
            .map_err(|e| match e {
                IndexError::VectorStore(msg) => {
                    ProcessingError::transient(format!("Vector store write failed: {}", msg))
                }
                other => ProcessingError::transient(other.to_string()),
            });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_failure(job, &e).await;
                return Err(e);
            }
        };

        match outcome.status {
            OutcomeStatus::Processed => {
                info!(recipe_id = %job.recipe_id, "Recipe embedded");
                self.update_progress(|stats| stats.record_completed(1))
                    .await;
                Ok(())
            }
            OutcomeStatus::Skipped => {
                info!(
                    recipe_id = %job.recipe_id,
                    reason = outcome.reason.map(|r| r.as_str()).unwrap_or(""),
                    "Recipe skipped"
                );
                self.update_progress(|stats| stats.record_skipped(1)).await;
                Ok(())
            }
            OutcomeStatus::Error => {
                let err = ProcessingError::transient(format!(
                    "Embedding failed for {}",
                    job.recipe_id
                ));
                self.record_failure(job, &err).await;
                Err(err)
            }
        }
    }

    fn name(&self) -> &'static str {
        "embed_job_processor"
    }

    async fn health_check(&self) -> Result<bool, ProcessingError> {
        Ok(self.progress.load().await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingClient;
    use crate::models::{Recipe, RecipeId};
    use crate::progress::InMemoryProgressStore;
    use crate::qdrant::MockVectorIndex;
    use crate::source::MockRecordSource;
    use stream_worker::registry::stream_name;

    fn batch(
        source: MockRecordSource,
        index: MockVectorIndex,
        embedder: MockEmbeddingClient,
    ) -> Arc<BatchProcessor> {
        Arc::new(BatchProcessor::new(
            Arc::new(source),
            Arc::new(index),
            Arc::new(embedder),
        ))
    }

    #[test]
    fn test_queue_streams() {
        assert_eq!(EmbedQueue::BASE_STREAM, "recipes:embed");
        assert_eq!(
            stream_name(EmbedQueue::BASE_STREAM, messaging::JobPriority::High),
            "recipes:embed:high"
        );
        assert_eq!(EmbedQueue::DLQ_STREAM, "recipes:embed:dlq");
    }

    #[tokio::test]
    async fn test_successful_job_updates_progress() {
        let mut source = MockRecordSource::new();
        source.expect_get().returning(|_| {
            Ok(Some(Recipe {
                title: Some("Soup".to_string()),
                ..Default::default()
            }))
        });

        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));
        index.expect_query().returning(|_, _| Ok(vec![]));
        index.expect_upsert().returning(|_| Ok(()));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);
        embedder.expect_embed().returning(|_| Ok(vec![0.1; 4]));

        let progress = Arc::new(InMemoryProgressStore::default());
        let mut seed = QueueStats::default();
        seed.record_enqueued(1);
        progress.save(&seed).await.unwrap();

        let processor = EmbedJobProcessor::new(batch(source, index, embedder), progress.clone());
        let job = EmbedJob::new(RecipeId::new("r1"));
        processor.process(&job).await.unwrap();

        let stats = progress.load().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.processing, 0);
    }

    #[tokio::test]
    async fn test_missing_record_completes_as_skip() {
        let mut source = MockRecordSource::new();
        source.expect_get().returning(|_| Ok(None));

        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));
        index.expect_query().returning(|_, _| Ok(vec![]));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);

        let progress = Arc::new(InMemoryProgressStore::default());
        let mut seed = QueueStats::default();
        seed.record_enqueued(1);
        progress.save(&seed).await.unwrap();

        let processor = EmbedJobProcessor::new(batch(source, index, embedder), progress.clone());
        let job = EmbedJob::new(RecipeId::new("gone"));

        // A missing record is not a retryable failure
        processor.process(&job).await.unwrap();

        let stats = progress.load().await.unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retryable() {
        let mut source = MockRecordSource::new();
        source.expect_get().returning(|_| {
            Ok(Some(Recipe {
                title: Some("Soup".to_string()),
                ..Default::default()
            }))
        });

        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));
        index.expect_query().returning(|_, _| Ok(vec![]));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);
        embedder
            .expect_embed()
            .returning(|_| Err(IndexError::EmbeddingFailed("rejected".to_string())));

        let progress = Arc::new(InMemoryProgressStore::default());
        let mut seed = QueueStats::default();
        seed.record_enqueued(1);
        progress.save(&seed).await.unwrap();

        let processor = EmbedJobProcessor::new(batch(source, index, embedder), progress.clone());
        let job = EmbedJob::new(RecipeId::new("r1"));

        let err = processor.process(&job).await.unwrap_err();
        assert!(err.should_retry(0));

        // First attempt of a retryable failure goes back to pending
        let stats = progress.load().await.unwrap();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_one_failure() {
        let mut source = MockRecordSource::new();
        source.expect_get().returning(|_| {
            Ok(Some(Recipe {
                title: Some("Soup".to_string()),
                ..Default::default()
            }))
        });

        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));
        index.expect_query().returning(|_, _| Ok(vec![]));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);
        embedder
            .expect_embed()
            .returning(|_| Err(IndexError::EmbeddingFailed("model down".to_string())));

        let progress = Arc::new(InMemoryProgressStore::default());
        let mut seed = QueueStats::default();
        seed.record_enqueued(1);
        progress.save(&seed).await.unwrap();

        let processor = EmbedJobProcessor::new(batch(source, index, embedder), progress.clone());

        // Initial delivery plus three retries, all failing
        let mut job = EmbedJob::new(RecipeId::new("r1"));
        for _ in 0..3 {
            assert!(processor.process(&job).await.is_err());
            job = job.with_retry();
        }
        assert!(processor.process(&job).await.is_err());

        let stats = progress.load().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.processing, 0);
        assert!(stats.is_consistent());
    }
}
