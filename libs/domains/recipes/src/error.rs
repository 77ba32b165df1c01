use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;

use crate::models::RecipeId;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Recipe not found: {0}")]
    RecipeNotFound(RecipeId),

    #[error("No embedding text could be synthesized for: {0}")]
    NoEmbeddingText(RecipeId),

    #[error("Recipe already has an embedding: {0}")]
    AlreadyEmbedded(RecipeId),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Storage access error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl From<qdrant_client::QdrantError> for IndexError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        IndexError::VectorStore(err.to_string())
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        IndexError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Internal(format!("JSON error: {}", err))
    }
}

impl From<redis::RedisError> for IndexError {
    fn from(err: redis::RedisError) -> Self {
        IndexError::Storage(format!("Redis error: {}", err))
    }
}

impl From<stream_worker::QueueError> for IndexError {
    fn from(err: stream_worker::QueueError) -> Self {
        IndexError::Storage(format!("Queue error: {}", err))
    }
}

impl From<core_config::ConfigError> for IndexError {
    fn from(err: core_config::ConfigError) -> Self {
        IndexError::Config(err.to_string())
    }
}

/// Convert IndexError to AppError for standardized HTTP error responses
impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::RecipeNotFound(id) => AppError::NotFound(format!("Recipe {} not found", id)),
            IndexError::NoEmbeddingText(id) => {
                AppError::BadRequest(format!("Recipe {} has no embeddable text", id))
            }
            IndexError::AlreadyEmbedded(id) => {
                AppError::Conflict(format!("Recipe {} already has an embedding", id))
            }
            IndexError::EmbeddingFailed(msg) => {
                AppError::InternalServerError(format!("Embedding error: {}", msg))
            }
            IndexError::VectorStore(msg) => {
                AppError::InternalServerError(format!("Vector store error: {}", msg))
            }
            IndexError::Storage(msg) => {
                AppError::InternalServerError(format!("Storage error: {}", msg))
            }
            IndexError::Config(msg) => {
                AppError::InternalServerError(format!("Config error: {}", msg))
            }
            IndexError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for IndexError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_maps_to_500() {
        let err = IndexError::Storage("record store unreachable".to_string());
        let app: AppError = err.into();
        assert!(matches!(app, AppError::InternalServerError(_)));
    }

    #[test]
    fn test_queue_error_maps_to_storage() {
        let err: IndexError = stream_worker::QueueError::Internal("XADD failed".to_string()).into();
        assert!(matches!(err, IndexError::Storage(_)));

        let app: AppError = err.into();
        assert!(matches!(app, AppError::InternalServerError(_)));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = IndexError::RecipeNotFound(RecipeId::new("r1"));
        let app: AppError = err.into();
        assert!(matches!(app, AppError::NotFound(_)));
    }
}
