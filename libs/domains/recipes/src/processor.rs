//! Budgeted batch processor.
//!
//! Drives the per-record pipeline (dedup, fetch, synthesize, embed,
//! upsert) over one bounded batch of candidates, substituting deduped
//! candidates with fresh backlog keys so each invocation makes forward
//! progress.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::budget::CallBudget;
use crate::dedup::DedupChecker;
use crate::embedding::EmbeddingClient;
use crate::error::IndexResult;
use crate::models::{
    BatchReport, OutcomeReason, Recipe, RecipeId, RecordOutcome, VectorEntry,
};
use crate::qdrant::VectorIndex;
use crate::source::RecordSource;
use crate::synth::synthesize;

/// Cap on backlog substitutions per batch, to bound scanning.
pub const MAX_SUBSTITUTIONS: usize = 10;

/// Records per sub-batch before the pacing delay.
const SUB_BATCH_SIZE: u32 = 5;

/// Pacing delay between sub-batches, to avoid bursting the model.
const SUB_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Description excerpt length stored in the vector payload.
const DESCRIPTION_EXCERPT_LEN: usize = 200;

pub struct BatchProcessor {
    source: Arc<dyn RecordSource>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    dedup: DedupChecker,
}

impl BatchProcessor {
    pub fn new(
        source: Arc<dyn RecordSource>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        let dedup = DedupChecker::new(index.clone(), embedder.dimension());
        Self {
            source,
            index,
            embedder,
            dedup,
        }
    }

    /// Process one bounded batch within the invocation's call budget.
    ///
    /// `backlog` supplies substitute keys when a candidate turns out to be
    /// already embedded. Stopping on an exhausted budget is a normal
    /// logged termination; an upsert failure propagates because the
    /// record's state is indeterminate.
    pub async fn process_batch(
        &self,
        candidates: Vec<RecipeId>,
        backlog: Vec<RecipeId>,
        budget: &mut CallBudget,
        force: bool,
    ) -> IndexResult<BatchReport> {
        let started = std::time::Instant::now();
        let calls_before = budget.used();

        let mut report = BatchReport::default();
        let mut queue: VecDeque<RecipeId> = candidates.into();
        let mut backlog: VecDeque<RecipeId> = backlog.into();
        let mut substitutions = 0usize;
        let mut pipelines_run = 0u32;

        'candidates: while let Some(candidate) = queue.pop_front() {
            if !budget.can_run_pipeline() {
                info!(
                    used = budget.used(),
                    ceiling = budget.ceiling(),
                    remaining_backlog = queue.len() + backlog.len(),
                    "Call budget exhausted, leaving remaining backlog for next trigger"
                );
                break;
            }

            // Dedup, substituting already-embedded candidates from the
            // backlog. Substitutes are re-checked; each check is one
            // budgeted call.
            let mut current = candidate;
            if !force {
                loop {
                    if !budget.can_run_pipeline() {
                        info!(
                            used = budget.used(),
                            ceiling = budget.ceiling(),
                            "Call budget exhausted during dedup, stopping"
                        );
                        break 'candidates;
                    }

                    budget.charge();
                    if !self.dedup.has_embedding(&current).await {
                        break;
                    }

                    debug!(recipe_id = %current, "Already embedded, skipping");
                    report.record(RecordOutcome::skipped(
                        current,
                        OutcomeReason::AlreadyHasEmbedding,
                    ));

                    if substitutions >= MAX_SUBSTITUTIONS {
                        continue 'candidates;
                    }
                    let Some(substitute) = backlog.pop_front() else {
                        continue 'candidates;
                    };
                    substitutions += 1;
                    current = substitute;
                }
            }

            // Fetch
            budget.charge();
            let recipe = match self.source.get(&current).await {
                Ok(Some(recipe)) => recipe,
                Ok(None) => {
                    report.record(RecordOutcome::skipped(current, OutcomeReason::NoData));
                    continue;
                }
                Err(e) => {
                    warn!(recipe_id = %current, error = %e, "Record fetch failed, skipping");
                    report.record(RecordOutcome::skipped(current, OutcomeReason::NoData));
                    continue;
                }
            };

            // Synthesize
            let Some(text) = synthesize(&recipe) else {
                report.record(RecordOutcome::skipped(current, OutcomeReason::NoText));
                continue;
            };

            // Embed
            budget.charge();
            let vector = match self.embedder.embed(&text).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(recipe_id = %current, error = %e, "Embedding failed");
                    report.record(RecordOutcome::error(
                        current,
                        OutcomeReason::EmbeddingFailed,
                    ));
                    continue;
                }
            };

            // Upsert; failures here propagate
            budget.charge();
            let entry = VectorEntry {
                payload: build_payload(&recipe),
                id: current.clone(),
                vector,
            };
            self.index.upsert(vec![entry]).await?;

            report.record(RecordOutcome::processed(current));

            pipelines_run += 1;
            if pipelines_run % SUB_BATCH_SIZE == 0 && !queue.is_empty() {
                tokio::time::sleep(SUB_BATCH_DELAY).await;
            }
        }

        report.calls_used = budget.used() - calls_before;
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            processed = report.processed,
            skipped = report.skipped,
            errors = report.errors,
            calls_used = report.calls_used,
            duration_ms = report.duration_ms,
            "Batch pass finished"
        );

        Ok(report)
    }

    /// Run the full pipeline for a single recipe.
    ///
    /// Used by the queue consumer, which handles one job at a time.
    pub async fn process_one(
        &self,
        id: &RecipeId,
        budget: &mut CallBudget,
        force: bool,
    ) -> IndexResult<RecordOutcome> {
        let report = self
            .process_batch(vec![id.clone()], vec![], budget, force)
            .await?;

        Ok(report
            .details
            .into_iter()
            .next()
            .unwrap_or_else(|| RecordOutcome::skipped(id.clone(), OutcomeReason::NoData)))
    }
}

/// Metadata stored next to the vector.
fn build_payload(recipe: &Recipe) -> serde_json::Value {
    let excerpt = recipe
        .description
        .as_deref()
        .map(|d| d.chars().take(DESCRIPTION_EXCERPT_LEN).collect::<String>());

    serde_json::json!({
        "title": recipe.title,
        "description": excerpt,
        "total_time": recipe.total_time,
        "category": recipe.category,
        "url": recipe.url,
        "last_updated": Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingClient;
    use crate::error::IndexError;
    use crate::qdrant::MockVectorIndex;
    use crate::source::MockRecordSource;
    use mockall::predicate::always;

    fn recipe_with_text(title: &str) -> Recipe {
        Recipe {
            title: Some(title.to_string()),
            ingredients: vec!["flour".to_string()],
            ..Default::default()
        }
    }

    fn embedder_ok() -> MockEmbeddingClient {
        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);
        embedder.expect_embed().returning(|_| Ok(vec![0.1; 4]));
        embedder
    }

    fn index_empty() -> MockVectorIndex {
        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));
        index.expect_query().returning(|_, _| Ok(vec![]));
        index.expect_upsert().returning(|_| Ok(()));
        index
    }

    fn processor(
        source: MockRecordSource,
        index: MockVectorIndex,
        embedder: MockEmbeddingClient,
    ) -> BatchProcessor {
        BatchProcessor::new(Arc::new(source), Arc::new(index), Arc::new(embedder))
    }

    #[tokio::test]
    async fn test_two_fresh_records_both_processed() {
        // Scenario: two keys, neither embedded, ample budget
        let mut source = MockRecordSource::new();
        source
            .expect_get()
            .returning(|id| Ok(Some(recipe_with_text(id.as_str()))));

        let p = processor(source, index_empty(), embedder_ok());
        let mut budget = CallBudget::new(10);

        let report = p
            .process_batch(
                vec![RecipeId::new("a"), RecipeId::new("b")],
                vec![],
                &mut budget,
                false,
            )
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.errors, 0);
        assert_eq!(report.calls_used, 8);
    }

    #[tokio::test]
    async fn test_already_embedded_is_skipped() {
        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|ids| Ok(ids.to_vec()));

        let source = MockRecordSource::new();
        let p = processor(source, index, embedder_ok());
        let mut budget = CallBudget::new(10);

        let report = p
            .process_batch(vec![RecipeId::new("a")], vec![], &mut budget, false)
            .await
            .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.details[0].reason,
            Some(OutcomeReason::AlreadyHasEmbedding)
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_no_data_skip() {
        let mut source = MockRecordSource::new();
        source.expect_get().returning(|_| Ok(None));

        let p = processor(source, index_empty(), embedder_ok());
        let mut budget = CallBudget::new(10);

        let report = p
            .process_batch(vec![RecipeId::new("gone")], vec![], &mut budget, false)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.details[0].reason, Some(OutcomeReason::NoData));
    }

    #[tokio::test]
    async fn test_empty_synthesis_is_no_text_skip() {
        let mut source = MockRecordSource::new();
        source.expect_get().returning(|_| Ok(Some(Recipe::default())));

        let p = processor(source, index_empty(), embedder_ok());
        let mut budget = CallBudget::new(10);

        let report = p
            .process_batch(vec![RecipeId::new("blank")], vec![], &mut budget, false)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.details[0].reason, Some(OutcomeReason::NoText));
    }

    #[tokio::test]
    async fn test_embedding_failure_continues_batch() {
        let mut source = MockRecordSource::new();
        source
            .expect_get()
            .returning(|id| Ok(Some(recipe_with_text(id.as_str()))));

        let mut embedder = MockEmbeddingClient::new();
        embedder.expect_dimension().return_const(4usize);
        let mut first = true;
        embedder.expect_embed().returning(move |_| {
            if first {
                first = false;
                Err(IndexError::EmbeddingFailed("model rejected".to_string()))
            } else {
                Ok(vec![0.1; 4])
            }
        });

        let p = processor(source, index_empty(), embedder);
        let mut budget = CallBudget::new(20);

        let report = p
            .process_batch(
                vec![RecipeId::new("bad"), RecipeId::new("good")],
                vec![],
                &mut budget,
                false,
            )
            .await
            .unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(
            report.details[0].reason,
            Some(OutcomeReason::EmbeddingFailed)
        );
    }

    #[tokio::test]
    async fn test_upsert_failure_propagates() {
        let mut source = MockRecordSource::new();
        source
            .expect_get()
            .returning(|id| Ok(Some(recipe_with_text(id.as_str()))));

        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|_| Ok(vec![]));
        index.expect_query().returning(|_, _| Ok(vec![]));
        index
            .expect_upsert()
            .with(always())
            .returning(|_| Err(IndexError::VectorStore("write failed".to_string())));

        let p = processor(source, index, embedder_ok());
        let mut budget = CallBudget::new(10);

        let result = p
            .process_batch(vec![RecipeId::new("a")], vec![], &mut budget, false)
            .await;

        assert!(matches!(result, Err(IndexError::VectorStore(_))));
    }

    #[tokio::test]
    async fn test_budget_never_exceeded() {
        let mut source = MockRecordSource::new();
        source
            .expect_get()
            .returning(|id| Ok(Some(recipe_with_text(id.as_str()))));

        let p = processor(source, index_empty(), embedder_ok());
        let mut budget = CallBudget::new(9);

        // Nine units fit two full pipelines at most; the third candidate
        // must be left behind
        let candidates = (0..50).map(|i| RecipeId::new(format!("r{}", i))).collect();
        let report = p
            .process_batch(candidates, vec![], &mut budget, false)
            .await
            .unwrap();

        assert!(budget.used() <= budget.ceiling());
        assert_eq!(report.processed, 2);
        assert_eq!(report.calls_used, 8);
    }

    #[tokio::test]
    async fn test_deduped_candidate_substituted_from_backlog() {
        // "a" is embedded; "fresh" from the backlog takes its slot and is
        // re-checked before processing
        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|ids| {
            if ids[0].as_str() == "a" {
                Ok(ids.to_vec())
            } else {
                Ok(vec![])
            }
        });
        index.expect_query().returning(|_, _| Ok(vec![]));
        index.expect_upsert().returning(|_| Ok(()));

        let mut source = MockRecordSource::new();
        source
            .expect_get()
            .returning(|id| Ok(Some(recipe_with_text(id.as_str()))));

        let p = processor(source, index, embedder_ok());
        let mut budget = CallBudget::new(20);

        let report = p
            .process_batch(
                vec![RecipeId::new("a")],
                vec![RecipeId::new("fresh")],
                &mut budget,
                false,
            )
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(report.details[1].recipe_id, RecipeId::new("fresh"));
        // dedup(a) + dedup(fresh) + fetch + embed + upsert
        assert_eq!(report.calls_used, 5);
    }

    #[tokio::test]
    async fn test_substitutions_are_bounded() {
        // Every key is already embedded; the substitution chain must stop
        // at the cap instead of draining the whole backlog
        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|ids| Ok(ids.to_vec()));

        let source = MockRecordSource::new();
        let p = processor(source, index, embedder_ok());
        let mut budget = CallBudget::new(100);

        let backlog = (0..50).map(|i| RecipeId::new(format!("b{}", i))).collect();
        let report = p
            .process_batch(vec![RecipeId::new("a")], backlog, &mut budget, false)
            .await
            .unwrap();

        // Original candidate + at most MAX_SUBSTITUTIONS substitutes
        assert_eq!(report.skipped as usize, 1 + MAX_SUBSTITUTIONS);
    }

    #[tokio::test]
    async fn test_force_skips_dedup() {
        let mut index = MockVectorIndex::new();
        // Would dedup-hit if checked
        index.expect_get_by_ids().returning(|ids| Ok(ids.to_vec()));
        index.expect_query().returning(|_, _| Ok(vec![]));
        index.expect_upsert().returning(|_| Ok(()));

        let mut source = MockRecordSource::new();
        source
            .expect_get()
            .returning(|id| Ok(Some(recipe_with_text(id.as_str()))));

        let p = processor(source, index, embedder_ok());
        let mut budget = CallBudget::new(10);

        let report = p
            .process_batch(vec![RecipeId::new("a")], vec![], &mut budget, true)
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        // No dedup charge when forced: fetch + embed + upsert
        assert_eq!(report.calls_used, 3);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        // After a successful run the index reports the ids as present, so
        // a second pass over the same set does no embedding work
        let mut index = MockVectorIndex::new();
        index.expect_get_by_ids().returning(|ids| Ok(ids.to_vec()));

        let source = MockRecordSource::new();
        let p = processor(source, index, embedder_ok());
        let mut budget = CallBudget::new(20);

        let report = p
            .process_batch(
                vec![RecipeId::new("a"), RecipeId::new("b")],
                vec![],
                &mut budget,
                false,
            )
            .await
            .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 2);
    }
}
