//! Dedup checker.
//!
//! Decides whether a recipe already has a stored vector. Fails open: any
//! index error is logged and treated as "not present", so a flaky index
//! can at worst cause wasted re-embedding, never silently dropped records.

use std::sync::Arc;

use tracing::warn;

use crate::models::RecipeId;
use crate::qdrant::VectorIndex;

/// Result count for the similarity-query fallback.
const FALLBACK_TOP_K: usize = 1000;

pub struct DedupChecker {
    index: Arc<dyn VectorIndex>,
    dimension: usize,
}

impl DedupChecker {
    pub fn new(index: Arc<dyn VectorIndex>, dimension: usize) -> Self {
        Self { index, dimension }
    }

    /// Whether `id` already has a stored vector.
    ///
    /// Exact by-id lookup first; if that returns empty or errors, fall
    /// back to a zero-vector similarity query and check membership.
    pub async fn has_embedding(&self, id: &RecipeId) -> bool {
        match self.index.get_by_ids(std::slice::from_ref(id)).await {
            Ok(found) if !found.is_empty() => return true,
            Ok(_) => {}
            Err(e) => {
                warn!(recipe_id = %id, error = %e, "Dedup by-id lookup failed, trying query fallback");
            }
        }

        match self
            .index
            .query(vec![0.0; self.dimension], FALLBACK_TOP_K)
            .await
        {
            Ok(matches) => matches.iter().any(|m| &m.id == id),
            Err(e) => {
                warn!(recipe_id = %id, error = %e, "Dedup query fallback failed, treating as not present");
                false
            }
        }
    }
}
