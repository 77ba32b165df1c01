//! Indexer orchestration.
//!
//! Ties the record source, vector index, batch processor, queue producer
//! and progress store together behind the operations the HTTP surface
//! and the scheduler invoke.

use async_trait::async_trait;
use chrono::Utc;
use messaging::JobPriority;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::sync::Arc;
use stream_worker::StreamProducer;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::budget::CallBudget;
use crate::error::IndexResult;
use crate::models::{BatchReport, EmbedJob, ProgressStatus, QueueStats, RecipeId};
use crate::processor::{BatchProcessor, MAX_SUBSTITUTIONS};
use crate::progress::ProgressStore;
use crate::qdrant::VectorIndex;
use crate::queue::EmbedQueue;
use crate::source::RecordSource;

/// Candidates per on-demand embed pass.
const EMBED_BATCH_SIZE: usize = 5;

/// Call ceiling for on-demand passes; keeps interactive requests quick.
const ON_DEMAND_CEILING: u32 = 25;

/// Candidates per scheduled pass, which gets the full budget.
const SCHEDULED_BATCH_SIZE: usize = 10;

/// Page cap for full-source population, against runaway cursors.
const MAX_POPULATE_PAGES: usize = 1000;

/// Destination for enqueued embedding jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn enqueue(&self, jobs: Vec<EmbedJob>) -> IndexResult<u64>;
}

/// [`JobSink`] backed by the priority streams.
pub struct StreamJobSink {
    producer: StreamProducer,
}

impl StreamJobSink {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            producer: StreamProducer::from_queue_def::<EmbedQueue>(redis),
        }
    }
}

#[async_trait]
impl JobSink for StreamJobSink {
    async fn enqueue(&self, jobs: Vec<EmbedJob>) -> IndexResult<u64> {
        if jobs.is_empty() {
            return Ok(0);
        }
        let ids = self.producer.send_batch(&jobs).await?;
        Ok(ids.len() as u64)
    }
}

/// Result of a queue population run.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PopulateReport {
    /// Records examined in the source listing.
    pub checked: u64,
    /// Records without a stored vector.
    pub found: u64,
    /// Jobs actually enqueued.
    pub added_to_queue: u64,
}

/// Progress counters plus the derived view fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProgressView {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub percentage: f64,
    pub status: ProgressStatus,
}

pub struct IndexerService {
    source: Arc<dyn RecordSource>,
    index: Arc<dyn VectorIndex>,
    processor: Arc<BatchProcessor>,
    sink: Arc<dyn JobSink>,
    progress: Arc<dyn ProgressStore>,
}

impl IndexerService {
    pub fn new(
        source: Arc<dyn RecordSource>,
        index: Arc<dyn VectorIndex>,
        processor: Arc<BatchProcessor>,
        sink: Arc<dyn JobSink>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            source,
            index,
            processor,
            sink,
            progress,
        }
    }

    /// Run one budgeted embed pass over the head of the source listing.
    ///
    /// The first page supplies both the candidate batch and the backlog
    /// used to substitute already-embedded candidates. Scheduled passes
    /// get the full call budget and a larger batch; on-demand passes stay
    /// small so the request returns promptly.
    pub async fn run_embed_pass(&self, scheduled: bool) -> IndexResult<BatchReport> {
        let (batch_size, mut budget) = if scheduled {
            (SCHEDULED_BATCH_SIZE, CallBudget::default())
        } else {
            (EMBED_BATCH_SIZE, CallBudget::new(ON_DEMAND_CEILING))
        };

        budget.charge();
        let page = self.source.list(None).await?;

        let mut ids = page.ids;
        let backlog = if ids.len() > batch_size {
            ids.split_off(batch_size)
        } else {
            vec![]
        };
        let backlog: Vec<RecipeId> = backlog.into_iter().take(MAX_SUBSTITUTIONS).collect();

        if ids.is_empty() {
            info!("No records listed, nothing to embed");
            return Ok(BatchReport::default());
        }

        let report = self
            .processor
            .process_batch(ids, backlog, &mut budget, false)
            .await?;
        self.touch_progress().await;
        Ok(report)
    }

    /// Stamp the tracker so direct-batch activity shows up in the
    /// staleness derivation. Tracker failures never fail the pass.
    async fn touch_progress(&self) {
        match self.progress.load().await {
            Ok(mut stats) => {
                stats.touch();
                if let Err(e) = self.progress.save(&stats).await {
                    warn!(error = %e, "Failed to save progress after batch pass");
                }
            }
            Err(e) => warn!(error = %e, "Failed to load progress after batch pass"),
        }
    }

    /// Walk the full source listing and enqueue every record that has no
    /// stored vector (or every record, when forced).
    pub async fn populate_queue(
        &self,
        force: bool,
        priority: JobPriority,
    ) -> IndexResult<PopulateReport> {
        let mut report = PopulateReport::default();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_POPULATE_PAGES {
            let page = self.source.list(cursor).await?;
            report.checked += page.ids.len() as u64;

            let fresh = if force {
                page.ids
            } else {
                self.filter_unembedded(page.ids).await
            };
            report.found += fresh.len() as u64;

            let jobs: Vec<EmbedJob> = fresh
                .into_iter()
                .map(|id| {
                    EmbedJob::new(id)
                        .with_priority(priority)
                        .with_force(force)
                })
                .collect();
            report.added_to_queue += self.sink.enqueue(jobs).await?;

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        if report.added_to_queue > 0 {
            let mut stats = self.progress.load().await?;
            stats.record_enqueued(report.added_to_queue);
            self.progress.save(&stats).await?;
        }

        info!(
            checked = report.checked,
            found = report.found,
            added = report.added_to_queue,
            "Queue population finished"
        );
        Ok(report)
    }

    /// Drop ids that already have a stored vector. Fails open: a lookup
    /// error keeps the whole page, at worst enqueueing redundant jobs.
    async fn filter_unembedded(&self, ids: Vec<RecipeId>) -> Vec<RecipeId> {
        match self.index.get_by_ids(&ids).await {
            Ok(embedded) => ids
                .into_iter()
                .filter(|id| !embedded.contains(id))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Embedded-id lookup failed, enqueueing full page");
                ids
            }
        }
    }

    /// Enqueue a single recipe for embedding.
    pub async fn add_to_queue(
        &self,
        recipe_id: RecipeId,
        priority: JobPriority,
        force: bool,
    ) -> IndexResult<()> {
        let job = EmbedJob::new(recipe_id.clone())
            .with_priority(priority)
            .with_force(force);
        self.sink.enqueue(vec![job]).await?;

        let mut stats = self.progress.load().await?;
        stats.record_enqueued(1);
        self.progress.save(&stats).await?;

        info!(recipe_id = %recipe_id, priority = priority.as_str(), "Recipe queued");
        Ok(())
    }

    /// Current progress with the derived percentage and status.
    pub async fn progress(&self) -> IndexResult<ProgressView> {
        let stats = self.progress.load().await?;
        Ok(ProgressView {
            percentage: stats.percentage(),
            status: stats.status(Utc::now()),
            stats,
        })
    }

    /// Reset all progress counters.
    pub async fn reset(&self) -> IndexResult<()> {
        self.progress.reset().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingClient;
    use crate::models::{Recipe, RecipePage};
    use crate::progress::InMemoryProgressStore;
    use crate::qdrant::MockVectorIndex;
    use crate::source::MockRecordSource;

    fn ids(names: &[&str]) -> Vec<RecipeId> {
        names.iter().map(|n| RecipeId::new(*n)).collect()
    }

    fn service(
        source: MockRecordSource,
        index: MockVectorIndex,
        embedder: MockEmbeddingClient,
        sink: MockJobSink,
    ) -> (IndexerService, Arc<InMemoryProgressStore>) {
        let source: Arc<dyn RecordSource> = Arc::new(source);
        let index: Arc<dyn VectorIndex> = Arc::new(index);
        let processor = Arc::new(BatchProcessor::new(
            source.clone(),
            index.clone(),
            Arc::new(embedder),
        ));
        let progress = Arc::new(InMemoryProgressStore::default());
        let svc = IndexerService::new(source, index, processor, Arc::new(sink), progress.clone());
        (svc, progress)
    }

    #[tokio::test]
    async fn test_populate_skips_embedded_records() {
        // Three listed records, one already embedded
        let mut source = MockRecordSource::new();
        source.expect_list().returning(|_| {
            Ok(RecipePage {
                ids: ids(&["a", "b", "c"]),
                next_cursor: None,
            })
        });

        let mut index = MockVectorIndex::new();
        index
            .expect_get_by_ids()
            .returning(|_| Ok(ids(&["b"])));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);

        let mut sink = MockJobSink::new();
        sink.expect_enqueue()
            .withf(|jobs| {
                jobs.len() == 2
                    && jobs.iter().all(|j| j.recipe_id.as_str() != "b")
                    && jobs.iter().all(|j| j.priority == JobPriority::Normal)
            })
            .returning(|jobs| Ok(jobs.len() as u64));

        let (svc, progress) = service(source, index, embedder, sink);
        let report = svc.populate_queue(false, JobPriority::Normal).await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.found, 2);
        assert_eq!(report.added_to_queue, 2);
        assert_eq!(progress.load().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_populate_force_enqueues_everything() {
        let mut source = MockRecordSource::new();
        source.expect_list().returning(|_| {
            Ok(RecipePage {
                ids: ids(&["a", "b"]),
                next_cursor: None,
            })
        });

        let index = MockVectorIndex::new();
        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);

        let mut sink = MockJobSink::new();
        sink.expect_enqueue()
            .withf(|jobs| jobs.len() == 2 && jobs.iter().all(|j| j.force))
            .returning(|jobs| Ok(jobs.len() as u64));

        let (svc, _) = service(source, index, embedder, sink);
        let report = svc.populate_queue(true, JobPriority::High).await.unwrap();

        assert_eq!(report.found, 2);
        assert_eq!(report.added_to_queue, 2);
    }

    #[tokio::test]
    async fn test_populate_follows_cursors() {
        let mut source = MockRecordSource::new();
        source.expect_list().returning(|cursor| match cursor {
            None => Ok(RecipePage {
                ids: ids(&["a", "b"]),
                next_cursor: Some("p2".to_string()),
            }),
            Some(_) => Ok(RecipePage {
                ids: ids(&["c"]),
                next_cursor: None,
            }),
        });

        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);

        let mut sink = MockJobSink::new();
        sink.expect_enqueue().returning(|jobs| Ok(jobs.len() as u64));

        let (svc, _) = service(source, index, embedder, sink);
        let report = svc.populate_queue(false, JobPriority::Normal).await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.added_to_queue, 3);
    }

    #[tokio::test]
    async fn test_embed_pass_processes_listed_records() {
        let mut source = MockRecordSource::new();
        source.expect_list().returning(|_| {
            Ok(RecipePage {
                ids: ids(&["a", "b"]),
                next_cursor: None,
            })
        });
        source.expect_get().returning(|id| {
            Ok(Some(Recipe {
                title: Some(id.as_str().to_string()),
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

        let (svc, _) = service(source, index, embedder, MockJobSink::new());
        let report = svc.run_embed_pass(false).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn test_embed_pass_refreshes_progress() {
        let mut source = MockRecordSource::new();
        source.expect_list().returning(|_| {
            Ok(RecipePage {
                ids: ids(&["a"]),
                next_cursor: None,
            })
        });
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

        let (svc, progress) = service(source, index, embedder, MockJobSink::new());

        let mut stale = QueueStats::default();
        stale.record_enqueued(2);
        stale.last_updated_at = Utc::now() - chrono::Duration::hours(1);
        progress.save(&stale).await.unwrap();
        assert_eq!(
            progress.load().await.unwrap().status(Utc::now()),
            ProgressStatus::Stale
        );

        svc.run_embed_pass(false).await.unwrap();

        let stats = progress.load().await.unwrap();
        assert_eq!(stats.status(Utc::now()), ProgressStatus::Running);
    }

    #[tokio::test]
    async fn test_add_to_queue_records_progress() {
        let source = MockRecordSource::new();
        let index = MockVectorIndex::new();
        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);

        let mut sink = MockJobSink::new();
        sink.expect_enqueue()
            .withf(|jobs| jobs.len() == 1 && jobs[0].priority == JobPriority::High)
            .returning(|_| Ok(1));

        let (svc, progress) = service(source, index, embedder, sink);
        svc.add_to_queue(RecipeId::new("r1"), JobPriority::High, false)
            .await
            .unwrap();

        let stats = progress.load().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn test_progress_view_derives_status() {
        let source = MockRecordSource::new();
        let index = MockVectorIndex::new();
        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);

        let (svc, progress) = service(source, index, embedder, MockJobSink::new());

        let view = svc.progress().await.unwrap();
        assert_eq!(view.status, ProgressStatus::Idle);
        assert_eq!(view.percentage, 0.0);

        let mut stats = QueueStats::default();
        stats.record_enqueued(4);
        stats.record_started(1);
        progress.save(&stats).await.unwrap();

        let view = svc.progress().await.unwrap();
        assert_eq!(view.status, ProgressStatus::Processing);
        assert_eq!(view.percentage, 0.0);
    }
}
