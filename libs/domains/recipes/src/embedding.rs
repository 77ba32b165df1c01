//! Embedding model port and the REST adapter.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Text to fixed-dimension vector.
///
/// One call per record; retries happen at the queue layer, never here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> IndexResult<Vec<f32>>;

    /// The dimensionality this client produces.
    fn dimension(&self) -> usize;
}

/// Embedding service settings.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
}

impl FromEnv for EmbeddingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_required("EMBEDDING_URL")?,
            api_key: std::env::var("EMBEDDING_API_KEY").ok(),
            model: env_or_default("EMBEDDING_MODEL", "baai/bge-small-en-v1.5"),
            dimension: core_config::env_parse("EMBEDDING_DIMENSION", 384)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-style `{model, input}` embeddings endpoint adapter.
pub struct RestEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

impl RestEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Reject malformed responses before they reach the vector index.
    fn validate(&self, vector: Vec<f32>) -> IndexResult<Vec<f32>> {
        if vector.is_empty() {
            return Err(IndexError::EmbeddingFailed(
                "model returned an empty vector".to_string(),
            ));
        }
        if vector.len() != self.config.dimension {
            return Err(IndexError::EmbeddingFailed(format!(
                "expected dimension {}, got {}",
                self.config.dimension,
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::EmbeddingFailed(
                "model returned non-finite values".to_string(),
            ));
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingClient for RestEmbeddingClient {
    async fn embed(&self, text: &str) -> IndexResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: vec![text],
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .header("Content-Type", "application/json");

        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexError::EmbeddingFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IndexError::EmbeddingFailed(format!(
                "embedding API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IndexError::EmbeddingFailed(e.to_string()))?;

        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| IndexError::EmbeddingFailed("no embedding returned".to_string()))?;

        self.validate(vector)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(dimension: usize) -> RestEmbeddingClient {
        RestEmbeddingClient::new(EmbeddingConfig {
            base_url: "http://embeddings.local".to_string(),
            api_key: None,
            model: "baai/bge-small-en-v1.5".to_string(),
            dimension,
        })
    }

    #[test]
    fn test_validate_accepts_expected_dimension() {
        let client = test_client(3);
        assert!(client.validate(vec![0.1, 0.2, 0.3]).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_vector() {
        let client = test_client(3);
        assert!(matches!(
            client.validate(vec![]),
            Err(IndexError::EmbeddingFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_dimension() {
        let client = test_client(384);
        assert!(client.validate(vec![0.1; 100]).is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let client = test_client(2);
        assert!(client.validate(vec![0.1, f32::NAN]).is_err());
    }

    #[test]
    fn test_config_defaults() {
        temp_env::with_vars(
            [
                ("EMBEDDING_URL", Some("http://embed:9000")),
                ("EMBEDDING_MODEL", None),
                ("EMBEDDING_DIMENSION", None),
                ("EMBEDDING_API_KEY", None),
            ],
            || {
                let config = EmbeddingConfig::from_env().unwrap();
                assert_eq!(config.base_url, "http://embed:9000");
                assert_eq!(config.model, "baai/bge-small-en-v1.5");
                assert_eq!(config.dimension, 384);
                assert!(config.api_key.is_none());
            },
        );
    }
}
