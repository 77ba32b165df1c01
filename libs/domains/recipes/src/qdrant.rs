//! Vector index port and the Qdrant adapter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, CreateCollectionBuilder, Distance, GetPointsBuilder, PointId, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use tracing::info;

use crate::error::{IndexError, IndexResult};
use crate::models::{RecipeId, VectorEntry, VectorMatch};

/// Payload key carrying the raw record id, so matches can be mapped back
/// without reversing the UUIDv5 derivation.
const RECIPE_ID_KEY: &str = "recipe_id";

/// Vector index operations the pipeline needs.
///
/// Upsert is idempotent: the same recipe id always replaces its point.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert entries; replaces existing points with the same id.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> IndexResult<()>;

    /// Which of these ids already have a stored vector.
    async fn get_by_ids(&self, ids: &[RecipeId]) -> IndexResult<Vec<RecipeId>>;

    /// Similarity query.
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> IndexResult<Vec<VectorMatch>>;
}

/// Qdrant connection settings.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub dimension: u64,
    pub timeout_secs: u64,
}

impl FromEnv for QdrantConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("QDRANT_URL")?,
            api_key: std::env::var("QDRANT_API_KEY").ok(),
            collection: env_or_default("QDRANT_COLLECTION", "recipes"),
            dimension: core_config::env_parse("QDRANT_DIMENSION", 384)?,
            timeout_secs: core_config::env_parse("QDRANT_TIMEOUT_SECS", 10)?,
        })
    }
}

/// Qdrant-backed vector index over a single fixed collection.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Connect and ensure the collection exists (cosine distance).
    pub async fn new(config: QdrantConfig) -> IndexResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| IndexError::VectorStore(format!("Failed to build client: {}", e)))?;

        let index = Self {
            client,
            collection: config.collection.clone(),
        };
        index.ensure_collection(config.dimension).await?;

        Ok(index)
    }

    async fn ensure_collection(&self, dimension: u64) -> IndexResult<()> {
        if self.client.collection_exists(&self.collection).await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
            )
            .await?;

        info!(
            collection = %self.collection,
            dimension = dimension,
            "Created vector collection"
        );
        Ok(())
    }

    fn entry_to_point(entry: VectorEntry) -> PointStruct {
        let mut payload = Self::payload_to_qdrant(entry.payload);
        payload.insert(
            RECIPE_ID_KEY.to_string(),
            QdrantValue::from(entry.id.0.clone()),
        );

        PointStruct::new(
            PointId::from(entry.id.point_id().to_string()),
            entry.vector,
            payload,
        )
    }

    fn payload_to_qdrant(payload: serde_json::Value) -> HashMap<String, QdrantValue> {
        let mut result = HashMap::new();

        if let serde_json::Value::Object(map) = payload {
            for (key, val) in map {
                if let Some(qdrant_val) = json_to_qdrant_value(val) {
                    result.insert(key, qdrant_val);
                }
            }
        }

        result
    }

    fn payload_recipe_id(payload: &HashMap<String, QdrantValue>) -> Option<RecipeId> {
        payload.get(RECIPE_ID_KEY).and_then(|v| match &v.kind {
            Some(qdrant::value::Kind::StringValue(s)) => Some(RecipeId::new(s.clone())),
            _ => None,
        })
    }
}

fn json_to_qdrant_value(val: serde_json::Value) -> Option<QdrantValue> {
    match val {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(QdrantValue::from(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else {
                n.as_f64().map(QdrantValue::from)
            }
        }
        serde_json::Value::String(s) => Some(QdrantValue::from(s)),
        // Complex types serialize to a string
        _ => Some(QdrantValue::from(val.to_string())),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> IndexResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = entries.into_iter().map(Self::entry_to_point).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;

        Ok(())
    }

    async fn get_by_ids(&self, ids: &[RecipeId]) -> IndexResult<Vec<RecipeId>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(id.point_id().to_string()))
            .collect();

        let results = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids)
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| Self::payload_recipe_id(&point.payload))
            .collect())
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> IndexResult<Vec<VectorMatch>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, top_k as u64)
                    .with_payload(true),
            )
            .await?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                Self::payload_recipe_id(&point.payload).map(|id| VectorMatch {
                    id,
                    score: point.score,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_to_point_keeps_raw_id() {
        let entry = VectorEntry {
            id: RecipeId::new("recipe-42"),
            vector: vec![0.1, 0.2],
            payload: serde_json::json!({"title": "Pancakes", "total_time": "PT20M"}),
        };

        let point = QdrantIndex::entry_to_point(entry);
        let id = QdrantIndex::payload_recipe_id(&point.payload).unwrap();
        assert_eq!(id, RecipeId::new("recipe-42"));
        assert!(point.payload.contains_key("title"));
    }

    #[test]
    fn test_json_payload_drops_nulls() {
        let payload = QdrantIndex::payload_to_qdrant(serde_json::json!({
            "title": "Soup",
            "category": null,
        }));
        assert!(payload.contains_key("title"));
        assert!(!payload.contains_key("category"));
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("QDRANT_URL", Some("http://qdrant:6334")),
                ("QDRANT_COLLECTION", None),
                ("QDRANT_DIMENSION", None),
            ],
            || {
                let config = QdrantConfig::from_env().unwrap();
                assert_eq!(config.collection, "recipes");
                assert_eq!(config.dimension, 384);
            },
        );
    }
}
