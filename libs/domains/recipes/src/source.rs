//! Record source port and the HTTP record-store adapter.
//!
//! The record store serves loosely structured recipe payloads, sometimes
//! gzip-compressed, sometimes nested under a wrapper field, with ingredient
//! and instruction entries that are either plain strings or objects. All of
//! that is normalized here into the canonical [`Recipe`] shape so nothing
//! downstream branches on raw payloads.

use std::io::Read;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_config::{ConfigError, FromEnv, env_required};
use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};
use crate::models::{Recipe, RecipeId, RecipePage};

/// Read-only access to the recipe record store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one record. `None` when the store has no data for this key.
    async fn get(&self, id: &RecipeId) -> IndexResult<Option<Recipe>>;

    /// Enumerate record keys, one page at a time.
    async fn list(&self, cursor: Option<String>) -> IndexResult<RecipePage>;
}

/// Record store connection settings.
#[derive(Debug, Clone)]
pub struct RecordStoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl FromEnv for RecordStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_required("RECIPE_STORE_URL")?,
            timeout_secs: core_config::env_parse("RECIPE_STORE_TIMEOUT_SECS", 30)?,
        })
    }
}

/// HTTP adapter for the record store proxy.
pub struct HttpRecordSource {
    client: Client,
    config: RecordStoreConfig,
}

impl HttpRecordSource {
    pub fn new(config: RecordStoreConfig) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn get(&self, id: &RecipeId) -> IndexResult<Option<Recipe>> {
        let url = format!("{}/recipes/{}", self.config.base_url, id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(IndexError::Storage(format!(
                "Record store returned {} for {}",
                response.status(),
                id
            )));
        }

        let bytes = response.bytes().await?;
        match normalize_raw(&bytes) {
            Ok(recipe) => Ok(Some(recipe)),
            Err(e) => {
                // Unparseable data is a skip, not a hard failure
                warn!(recipe_id = %id, error = %e, "Failed to normalize record");
                Ok(None)
            }
        }
    }

    async fn list(&self, cursor: Option<String>) -> IndexResult<RecipePage> {
        let mut url = format!("{}/recipes", self.config.base_url);
        if let Some(cursor) = &cursor {
            url = format!("{}?cursor={}", url, cursor);
        }

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(IndexError::Storage(format!(
                "Record store list returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let page = parse_list_body(&body);

        debug!(
            count = page.ids.len(),
            has_more = page.next_cursor.is_some(),
            "Listed record keys"
        );

        Ok(page)
    }
}

/// Pull `{keys: [...], nextCursor}` out of a listing response body.
fn parse_list_body(body: &Value) -> RecipePage {
    let ids: Vec<RecipeId> = body
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(RecipeId::from)
                .collect()
        })
        .unwrap_or_default();
    let next_cursor = body
        .get("nextCursor")
        .and_then(Value::as_str)
        .map(str::to_string);

    RecipePage { ids, next_cursor }
}

/// Normalize raw record bytes into the canonical recipe shape.
///
/// Accepts gzip-compressed or plain JSON, with the recipe possibly nested
/// under a `data` or `recipe` wrapper.
pub fn normalize_raw(bytes: &[u8]) -> IndexResult<Recipe> {
    let text = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| IndexError::Storage(format!("gzip decode failed: {}", e)))?;
        out
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    let mut value: Value = serde_json::from_str(&text)?;

    // Unwrap {data: {...}} / {recipe: {...}} envelopes
    for wrapper in ["data", "recipe"] {
        if let Some(inner) = value.get(wrapper) {
            if inner.is_object() {
                value = inner.clone();
            }
        }
    }

    Ok(normalize_value(&value))
}

fn normalize_value(value: &Value) -> Recipe {
    Recipe {
        title: first_string(value, &["title", "name"]),
        description: first_string(value, &["description"]),
        ingredients: string_list(value, &["ingredients", "recipeIngredient"]),
        instructions: string_list(value, &["instructions", "recipeInstructions"]),
        recipe_yield: first_string(value, &["recipeYield", "yield"]),
        prep_time: first_string(value, &["prepTime"]),
        cook_time: first_string(value, &["cookTime"]),
        total_time: first_string(value, &["totalTime"]),
        keywords: keywords_string(value),
        category: first_string(value, &["category", "recipeCategory"]),
        cuisine: first_string(value, &["cuisine", "recipeCuisine"]),
        url: first_string(value, &["url", "sourceUrl"]),
        scraped_at: first_string(value, &["scrapedAt", "scraped_at"])
            .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Flatten a list whose entries are plain strings or objects carrying
/// `text`/`name`.
fn string_list(value: &Value, keys: &[&str]) -> Vec<String> {
    let Some(array) = keys.iter().filter_map(|k| value.get(k)).find_map(Value::as_array) else {
        return Vec::new();
    };

    array
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(obj) => obj
                .get("text")
                .or_else(|| obj.get("name"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn keywords_string(value: &Value) -> Option<String> {
    match value.get("keywords") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Array(items)) => {
            let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if joined.is_empty() {
                None
            } else {
                Some(joined.join(", "))
            }
        }
        _ => None,
    }
}
