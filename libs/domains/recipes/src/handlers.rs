//! HTTP endpoints for the embedding indexer.

use axum::routing::{delete, get, post};
use axum::{Json, Router, extract::State};
use axum_helpers::{AppError, ErrorResponse};
use messaging::JobPriority;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::error::IndexResult;
use crate::models::{BatchReport, ProgressStatus, QueueStats, RecipeId, RecordOutcome};
use crate::service::{IndexerService, PopulateReport, ProgressView};

#[derive(OpenApi)]
#[openapi(
    paths(run_embed, populate_queue, add_to_queue, get_progress, reset_progress),
    components(schemas(
        EmbedRequest,
        PopulateRequest,
        AddToQueueRequest,
        BatchReport,
        PopulateReport,
        ProgressView,
        QueueStats,
        ProgressStatus,
        RecordOutcome,
        ErrorResponse,
    )),
    tags(
        (name = "Indexer", description = "Recipe embedding pipeline endpoints")
    )
)]
pub struct ApiDoc;

pub fn router(service: Arc<IndexerService>) -> Router {
    Router::new()
        .route("/embed", post(run_embed))
        .route("/populate-queue", post(populate_queue))
        .route("/queue/add", post(add_to_queue))
        .route("/progress", get(get_progress))
        .route("/reset", delete(reset_progress))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmbedRequest {
    /// Scheduled passes get the full call budget and a larger batch.
    #[serde(default)]
    pub scheduled: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PopulateRequest {
    /// Enqueue records even when they already have a vector.
    #[serde(default)]
    pub force_reprocess: bool,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "normal")]
    pub priority: Option<JobPriority>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToQueueRequest {
    pub recipe_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "high")]
    pub priority: Option<JobPriority>,
    #[serde(default)]
    pub force: bool,
}

/// Run one budgeted embedding pass immediately
#[utoipa::path(
    post,
    path = "/embed",
    tag = "Indexer",
    request_body = EmbedRequest,
    responses(
        (status = 200, description = "Batch pass report", body = BatchReport),
        (status = 500, description = "Vector store write failed", body = ErrorResponse)
    )
)]
async fn run_embed(
    State(service): State<Arc<IndexerService>>,
    body: Option<Json<EmbedRequest>>,
) -> IndexResult<Json<BatchReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let report = service.run_embed_pass(request.scheduled).await?;
    Ok(Json(report))
}

/// Enqueue every record that has no stored vector
#[utoipa::path(
    post,
    path = "/populate-queue",
    tag = "Indexer",
    request_body = PopulateRequest,
    responses(
        (status = 200, description = "Population report", body = PopulateReport),
        (status = 500, description = "Source listing or queue failed", body = ErrorResponse)
    )
)]
async fn populate_queue(
    State(service): State<Arc<IndexerService>>,
    body: Option<Json<PopulateRequest>>,
) -> IndexResult<Json<PopulateReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let priority = request.priority.unwrap_or_default();
    let report = service
        .populate_queue(request.force_reprocess, priority)
        .await?;
    Ok(Json(report))
}

/// Enqueue a single recipe
#[utoipa::path(
    post,
    path = "/queue/add",
    tag = "Indexer",
    request_body = AddToQueueRequest,
    responses(
        (status = 200, description = "Recipe queued", body = Value),
        (status = 400, description = "Missing recipeId parameter", body = ErrorResponse),
        (status = 500, description = "Queue write failed", body = ErrorResponse)
    )
)]
async fn add_to_queue(
    State(service): State<Arc<IndexerService>>,
    body: Option<Json<AddToQueueRequest>>,
) -> Result<Json<Value>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let recipe_id = request
        .recipe_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing recipeId parameter".to_string()))?;

    let priority = request.priority.unwrap_or_default();
    service
        .add_to_queue(RecipeId::new(recipe_id.clone()), priority, request.force)
        .await?;

    Ok(Json(json!({
        "status": "queued",
        "recipeId": recipe_id,
        "priority": priority.as_str(),
    })))
}

/// Current embedding progress
#[utoipa::path(
    get,
    path = "/progress",
    tag = "Indexer",
    responses(
        (status = 200, description = "Progress counters and derived status", body = Value),
        (status = 500, description = "Progress store unavailable", body = ErrorResponse)
    )
)]
async fn get_progress(
    State(service): State<Arc<IndexerService>>,
) -> IndexResult<Json<Value>> {
    let view = service.progress().await?;
    Ok(Json(json!({ "progress": view })))
}

/// Reset all progress counters
#[utoipa::path(
    delete,
    path = "/reset",
    tag = "Indexer",
    responses(
        (status = 200, description = "Counters cleared", body = Value),
        (status = 500, description = "Progress store unavailable", body = ErrorResponse)
    )
)]
async fn reset_progress(
    State(service): State<Arc<IndexerService>>,
) -> IndexResult<Json<Value>> {
    service.reset().await?;
    Ok(Json(json!({ "status": "success" })))
}
