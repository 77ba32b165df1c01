//! Recipe semantic-indexing domain.
//!
//! Embeds recipe records into a vector index for semantic search. The
//! pipeline for one record is: dedup against the index, fetch the record,
//! synthesize embedding text, embed, upsert. Work arrives either as one
//! budgeted batch pass (scheduled or via HTTP) or as individual jobs on
//! the priority streams.

pub mod budget;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod models;
pub mod processor;
pub mod progress;
pub mod qdrant;
pub mod queue;
pub mod service;
pub mod source;
pub mod synth;

pub use budget::{CALLS_PER_PIPELINE, CallBudget, DEFAULT_CEILING};
pub use dedup::DedupChecker;
pub use embedding::{EmbeddingClient, EmbeddingConfig, RestEmbeddingClient};
pub use error::{IndexError, IndexResult};
pub use handlers::{ApiDoc, router};
pub use models::{
    BatchReport, EmbedJob, OutcomeReason, OutcomeStatus, ProgressStatus, QueueStats, Recipe,
    RecipeId, RecipePage, RecordOutcome, VectorEntry, VectorMatch,
};
pub use processor::BatchProcessor;
pub use progress::{InMemoryProgressStore, ProgressStore, RedisProgressStore};
pub use qdrant::{QdrantConfig, QdrantIndex, VectorIndex};
pub use queue::{EmbedJobProcessor, EmbedQueue};
pub use service::{IndexerService, JobSink, PopulateReport, ProgressView, StreamJobSink};
pub use source::{HttpRecordSource, RecordSource, RecordStoreConfig};
pub use synth::{MAX_TEXT_LEN, synthesize};
