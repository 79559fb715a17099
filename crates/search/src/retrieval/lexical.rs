//! Lexical full-text search
//!
//! Provides keyword-based ranking over the document's precomputed text index

use super::RetrievalCandidate;
use crate::store::PassageStore;
use docforge_common::errors::{AppError, Result};
use docforge_common::metrics::{self, StageTimer};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Lexical retriever backed by the store's text index
#[derive(Clone)]
pub struct LexicalSearch {
    store: Arc<dyn PassageStore>,
}

impl LexicalSearch {
    /// Create a new lexical retriever
    pub fn new(store: Arc<dyn PassageStore>) -> Self {
        Self { store }
    }

    /// Return the `top_k` passages ranked by text relevance.
    ///
    /// Empty or whitespace-only queries return an empty list.
    pub async fn search(
        &self,
        document_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        if top_k < 1 {
            return Err(AppError::invalid("lexical_top_k", "must be at least 1"));
        }

        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        let timer = StageTimer::start();
        let result = self.store.text_query(document_id, query, top_k).await;

        match &result {
            Ok(hits) => {
                metrics::record_retrieval("lexical", timer.elapsed_secs(), hits.len(), true);
                debug!(
                    document_id = %document_id,
                    results = hits.len(),
                    elapsed_ms = timer.elapsed_ms(),
                    "Lexical search complete"
                );
            }
            Err(e) => {
                metrics::record_retrieval("lexical", timer.elapsed_secs(), 0, false);
                debug!(document_id = %document_id, error = %e, "Lexical search failed");
            }
        }

        let mut hits = result?;
        hits.truncate(top_k);
        Ok(hits)
    }
}
