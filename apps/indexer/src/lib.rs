//! Recipe Indexer Service
//!
//! Keeps a vector index in sync with the recipe store for semantic search.
//!
//! ## Architecture
//!
//! ```text
//! Recipe store (HTTP)          Redis Streams (recipes:embed:{priority})
//!   ↓ (list / fetch)             ↓ (Consumer Group: embed_workers)
//! IndexerService  ←──────────  StreamWorker<EmbedJob, EmbedJobProcessor>
//!   ↓ (dedup, synthesize, embed, upsert)
//! Qdrant collection (recipes)
//! ```
//!
//! Three things drive work into the pipeline:
//! - the HTTP API (`/api/embed`, `/api/populate-queue`, `/api/queue/add`)
//! - a cron schedule running a budgeted batch pass
//! - the stream worker draining queued jobs
//!
//! ## Features
//!
//! - Priority streams with consumer-group delivery
//! - Automatic retry with exponential backoff and a dead letter queue
//! - Per-invocation call budget with graceful early termination
//! - Graceful shutdown handling
//! - Health, readiness and metrics endpoints for Kubernetes probes

use axum::Router;
use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{Environment, FromEnv, app_info, env_or_default};
use domain_recipes::{
    ApiDoc, BatchProcessor, EmbedJob, EmbedJobProcessor, EmbedQueue, EmbeddingClient,
    EmbeddingConfig, HttpRecordSource, IndexerService, QdrantConfig, QdrantIndex, RecordSource,
    RecordStoreConfig, RedisProgressStore, RestEmbeddingClient, StreamJobSink, VectorIndex,
};
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use stream_worker::{HealthState, StreamWorker, WorkerConfig, metrics, worker_router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Start the health and admin HTTP server.
///
/// Provides endpoints for:
/// - Liveness probes: `/health`, `/healthz`
/// - Readiness probes: `/ready`, `/readyz`
/// - Stream monitoring: `/stream/info`
/// - Prometheus metrics: `/metrics`
/// - DLQ inspection: `/admin/dlq/messages`
async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = worker_router(health_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health and admin server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Schedule the recurring embed pass.
async fn start_scheduler(service: Arc<IndexerService>, cron_expr: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;

    let job = Job::new_async(cron_expr, move |_uuid, _l| {
        let service = service.clone();

        Box::pin(async move {
            info!("Running scheduled embed pass");

            match service.run_embed_pass(true).await {
                Ok(report) => {
                    info!(
                        processed = report.processed,
                        skipped = report.skipped,
                        errors = report.errors,
                        calls_used = report.calls_used,
                        "Scheduled embed pass complete"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Scheduled embed pass failed");
                }
            }
        })
    })?;

    sched.add(job).await?;
    sched.start().await?;
    info!(cron = cron_expr, "Embed schedule started");

    Ok(sched)
}

/// Run the indexer service.
///
/// This is the main entry point. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to Redis and Qdrant
/// 3. Starts the HTTP API, the health server, the cron schedule, and the
///    stream worker
/// 4. Drains everything on SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if any configuration is invalid or a connection to
/// Redis or Qdrant cannot be established.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting recipe indexer service");
    info!("Environment: {:?}", environment);

    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let health_port: u16 = core_config::env_parse("HEALTH_PORT", 8082)
        .wrap_err("Failed to parse HEALTH_PORT")?;
    // Six-field cron expression; default is every five minutes
    let cron_expr = env_or_default("EMBED_CRON", "0 */5 * * * *");

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    info!("Connecting to Redis...");
    let redis_client =
        redis::Client::open(redis_config.uri.as_str()).wrap_err("Invalid Redis URL")?;
    let redis = ConnectionManager::new(redis_client)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    let qdrant_config = QdrantConfig::from_env().wrap_err("Failed to load Qdrant configuration")?;
    info!(collection = %qdrant_config.collection, "Connecting to Qdrant...");
    let index: Arc<dyn VectorIndex> = Arc::new(
        QdrantIndex::new(qdrant_config)
            .await
            .wrap_err("Failed to connect to Qdrant")?,
    );
    info!("Connected to Qdrant successfully");

    let source_config =
        RecordStoreConfig::from_env().wrap_err("Failed to load recipe store configuration")?;
    let source: Arc<dyn RecordSource> = Arc::new(
        HttpRecordSource::new(source_config).wrap_err("Failed to build recipe store client")?,
    );

    let embedding_config =
        EmbeddingConfig::from_env().wrap_err("Failed to load embedding configuration")?;
    let embedder: Arc<dyn EmbeddingClient> = Arc::new(RestEmbeddingClient::new(embedding_config));

    let processor = Arc::new(BatchProcessor::new(
        source.clone(),
        index.clone(),
        embedder.clone(),
    ));
    let progress = Arc::new(RedisProgressStore::new(redis.clone()));
    let sink = Arc::new(StreamJobSink::new(redis.clone()));

    let service = Arc::new(IndexerService::new(
        source,
        index,
        processor.clone(),
        sink,
        progress.clone(),
    ));

    // Worker configuration; blocking reads give instant delivery and a
    // clean shutdown
    let worker_config = WorkerConfig::from_queue_def::<EmbedQueue>().with_blocking(Some(1000));
    info!(
        base_stream = %worker_config.base_stream,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        "Worker configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        axum_helpers::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        Arc::new(redis.clone()),
        app_info.name,
        app_info.version,
        worker_config.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    let api = domain_recipes::router(service.clone());
    let app = axum_helpers::create_router::<ApiDoc>(api)
        .await
        .wrap_err("Failed to build API router")?;
    let api_server_config = server_config.clone();
    tokio::spawn(async move {
        if let Err(e) = axum_helpers::create_app(app, &api_server_config).await {
            error!(error = %e, "API server failed");
        }
    });

    let mut scheduler = start_scheduler(service.clone(), &cron_expr).await?;

    info!("Starting embed job worker...");
    let job_processor = EmbedJobProcessor::new(processor, progress);
    let worker = StreamWorker::<EmbedJob, _>::new(redis, job_processor, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    scheduler.shutdown().await.ok();
    info!("Recipe indexer service stopped");
    Ok(())
}
