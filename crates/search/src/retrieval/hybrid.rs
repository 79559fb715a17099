//! Hybrid retrieval combining vector and lexical search
//!
//! Both retrievers run concurrently; their batches are fused with
//! [`WeightedFusion`] and the survivors are hydrated from the store.

use super::{
    fusion::WeightedFusion, lexical::LexicalSearch, vector::VectorSearch, FusedCandidate,
    FusionMetrics,
};
use crate::store::PassageStore;
use docforge_common::config::RetrievalConfig;
use docforge_common::errors::Result;
use docforge_common::metrics::{self, StageTimer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

/// Fusion and failure policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridConfig {
    /// Weight of the vector score; lexical gets `1 - vector_weight`
    pub vector_weight: f32,

    /// When one retriever fails, fuse the other's results instead of failing
    pub degrade_on_partial_failure: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            degrade_on_partial_failure: false,
        }
    }
}

impl From<&RetrievalConfig> for HybridConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_weight: config.vector_weight,
            degrade_on_partial_failure: config.degrade_on_partial_failure,
        }
    }
}

/// Hybrid search request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HybridSearchRequest {
    pub document_id: Uuid,

    pub query_text: String,

    #[validate(length(min = 1))]
    pub query_embedding: Vec<f32>,

    /// Embedding model the query vector was produced with
    #[validate(length(min = 1))]
    pub embedding_model: String,

    /// Candidate pool size for vector search
    #[validate(range(min = 1))]
    pub vector_top_k: usize,

    /// Candidate pool size for lexical search
    #[validate(range(min = 1))]
    pub lexical_top_k: usize,

    /// Final size after fusion
    #[validate(range(min = 1))]
    pub max_results: usize,
}

/// Hybrid search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchResponse {
    /// Fused candidates, best first, unique by passage id
    pub candidates: Vec<FusedCandidate>,

    pub metrics: FusionMetrics,

    pub query_time_ms: u64,
}

/// Hybrid retriever combining vector and lexical search
#[derive(Clone)]
pub struct HybridSearch {
    store: Arc<dyn PassageStore>,
    vector: VectorSearch,
    lexical: LexicalSearch,
    fusion: WeightedFusion,
    config: HybridConfig,
}

impl HybridSearch {
    /// Create a hybrid retriever over one store; the weight is validated here
    pub fn new(store: Arc<dyn PassageStore>, config: HybridConfig) -> Result<Self> {
        let fusion = WeightedFusion::new(config.vector_weight)?;
        Ok(Self {
            vector: VectorSearch::new(store.clone()),
            lexical: LexicalSearch::new(store.clone()),
            store,
            fusion,
            config,
        })
    }

    /// Run both retrievers, fuse, truncate, then hydrate passages
    pub async fn search(&self, request: &HybridSearchRequest) -> Result<HybridSearchResponse> {
        request.validate()?;

        let timer = StageTimer::start();

        // Execute both searches in parallel
        let (vector_results, lexical_results) = tokio::join!(
            self.vector.search(
                request.document_id,
                &request.query_embedding,
                &request.embedding_model,
                request.vector_top_k,
            ),
            self.lexical
                .search(request.document_id, &request.query_text, request.lexical_top_k)
        );

        let degrade = self.config.degrade_on_partial_failure;
        let (vector_hits, lexical_hits) = match (vector_results, lexical_results) {
            (Ok(v), Ok(l)) => (v, l),
            (Err(e), Err(_)) => return Err(e),
            (Err(e), Ok(l)) if degrade => {
                warn!(error = %e, "Vector search failed, continuing with lexical results");
                (vec![], l)
            }
            (Ok(v), Err(e)) if degrade => {
                warn!(error = %e, "Lexical search failed, continuing with vector results");
                (v, vec![])
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
        };

        let outcome = self
            .fusion
            .fuse(&vector_hits, &lexical_hits, request.max_results);
        let mut fusion_metrics = outcome.metrics;

        let ids: Vec<Uuid> = outcome.scores.iter().map(|s| s.passage_id).collect();
        let passages = self
            .store
            .fetch_passages(request.document_id, &ids, &request.embedding_model)
            .await?;
        let mut passages: HashMap<Uuid, _> = passages.into_iter().map(|p| (p.id, p)).collect();

        let mut candidates = Vec::with_capacity(outcome.scores.len());
        for score in outcome.scores {
            let Some(passage) = passages.remove(&score.passage_id) else {
                warn!(
                    passage_id = %score.passage_id,
                    backend = self.store.backend(),
                    "Fused passage missing from store, dropping"
                );
                continue;
            };

            candidates.push(FusedCandidate {
                passage_id: score.passage_id,
                text: passage.text,
                fused_score: score.fused_score,
                source: score.source,
                pages: passage.pages,
                section_path: passage.section_path,
                is_table: passage.is_table,
                is_figure: passage.is_figure,
                vector_score: score.vector_score,
                lexical_score: score.lexical_score,
                embedding: passage.embedding,
            });
        }
        fusion_metrics.final_count = candidates.len();

        metrics::record_fusion(
            fusion_metrics.vector_only_count,
            fusion_metrics.lexical_only_count,
            fusion_metrics.overlap_count,
        );

        let query_time_ms = timer.elapsed_ms();
        debug!(
            document_id = %request.document_id,
            vector = fusion_metrics.vector_count,
            lexical = fusion_metrics.lexical_count,
            overlap = fusion_metrics.overlap_count,
            results = fusion_metrics.final_count,
            elapsed_ms = query_time_ms,
            "Hybrid search complete"
        );

        Ok(HybridSearchResponse {
            candidates,
            metrics: fusion_metrics,
            query_time_ms,
        })
    }
}

impl std::fmt::Debug for HybridSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearch")
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::{PageRange, Passage};
    use crate::retrieval::FusionSource;
    use crate::store::InMemoryStore;
    use docforge_common::errors::AppError;

    const MODEL: &str = "test-model";

    fn passage(doc: Uuid, id: u128, text: &str, embedding: Vec<f32>) -> Passage {
        Passage {
            id: Uuid::from_u128(id),
            document_id: doc,
            text: text.to_string(),
            pages: PageRange::single(id as u32),
            section_path: vec![],
            embedding: Some(embedding),
            is_table: false,
            is_figure: false,
        }
    }

    async fn fixture(doc: Uuid) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for p in [
            passage(doc, 1, "TP53 tumour suppressor mutations", vec![1.0, 0.0]),
            passage(doc, 2, "unrelated methods section", vec![0.9, 0.1]),
            passage(doc, 3, "TP53 pathway overview", vec![0.0, 1.0]),
        ] {
            store.insert(p, MODEL).await.unwrap();
        }
        store
    }

    fn request(doc: Uuid, query: &str) -> HybridSearchRequest {
        HybridSearchRequest {
            document_id: doc,
            query_text: query.to_string(),
            query_embedding: vec![1.0, 0.0],
            embedding_model: MODEL.to_string(),
            vector_top_k: 10,
            lexical_top_k: 10,
            max_results: 10,
        }
    }

    #[tokio::test]
    async fn test_hybrid_tags_and_metrics() {
        let doc = Uuid::from_u128(50);
        let hybrid = HybridSearch::new(fixture(doc).await, HybridConfig::default()).unwrap();

        let response = hybrid.search(&request(doc, "TP53")).await.unwrap();
        let m = response.metrics;
        assert_eq!(m.vector_count, 3);
        assert_eq!(m.lexical_count, 2);
        assert_eq!(m.overlap_count, 2);
        assert_eq!(m.vector_only_count, 1);
        assert_eq!(m.lexical_only_count, 0);
        assert_eq!(m.final_count, 3);

        let top = &response.candidates[0];
        assert_eq!(top.passage_id, Uuid::from_u128(1));
        assert_eq!(top.source, FusionSource::Both);
        assert_eq!(top.embedding, Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_empty_lexical_still_returns_vector() {
        let doc = Uuid::from_u128(50);
        let hybrid = HybridSearch::new(fixture(doc).await, HybridConfig::default()).unwrap();

        let response = hybrid.search(&request(doc, "   ")).await.unwrap();
        assert_eq!(response.candidates.len(), 3);
        assert!(response
            .candidates
            .iter()
            .all(|c| c.source == FusionSource::Vector));
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_backend() {
        let doc = Uuid::from_u128(50);
        let store = fixture(doc).await;
        store.set_available(false);
        let hybrid = HybridSearch::new(store, HybridConfig::default()).unwrap();

        let mut req = request(doc, "TP53");
        req.max_results = 0;
        let err = hybrid.search(&req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_invalid_weight() {
        let config = HybridConfig {
            vector_weight: 1.5,
            ..HybridConfig::default()
        };
        let err = HybridSearch::new(Arc::new(InMemoryStore::new()), config).unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_total_outage_propagates() {
        let doc = Uuid::from_u128(50);
        let store = fixture(doc).await;
        store.set_available(false);
        let config = HybridConfig {
            degrade_on_partial_failure: true,
            ..HybridConfig::default()
        };
        let hybrid = HybridSearch::new(store, config).unwrap();

        let err = hybrid.search(&request(doc, "TP53")).await.unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable { .. }));
    }
}
