//! Vector similarity search
//!
//! Nearest-neighbour lookup over precomputed passage embeddings for one
//! document and one embedding model

use super::RetrievalCandidate;
use crate::store::PassageStore;
use docforge_common::errors::{AppError, Result};
use docforge_common::metrics::{self, StageTimer};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Vector retriever backed by a passage store
#[derive(Clone)]
pub struct VectorSearch {
    store: Arc<dyn PassageStore>,
}

impl VectorSearch {
    /// Create a new vector retriever
    pub fn new(store: Arc<dyn PassageStore>) -> Self {
        Self { store }
    }

    /// Return the `top_k` most similar passages, by descending cosine similarity.
    ///
    /// Unknown documents or models yield an empty list; store outages surface
    /// as `RetrievalUnavailable`.
    pub async fn search(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        if top_k < 1 {
            return Err(AppError::invalid("vector_top_k", "must be at least 1"));
        }
        if embedding.is_empty() {
            return Err(AppError::invalid("query_embedding", "must not be empty"));
        }

        let timer = StageTimer::start();
        let result = self
            .store
            .vector_query(document_id, embedding, model, top_k)
            .await;

        match &result {
            Ok(hits) => {
                metrics::record_retrieval("vector", timer.elapsed_secs(), hits.len(), true);
                debug!(
                    document_id = %document_id,
                    model = model,
                    results = hits.len(),
                    elapsed_ms = timer.elapsed_ms(),
                    "Vector search complete"
                );
            }
            Err(e) => {
                metrics::record_retrieval("vector", timer.elapsed_secs(), 0, false);
                debug!(document_id = %document_id, error = %e, "Vector search failed");
            }
        }

        let mut hits = result?;
        hits.truncate(top_k);
        Ok(hits)
    }
}
