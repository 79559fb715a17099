//! Query pipeline: embed, hybrid search, rerank with MMR, cite
//!
//! A [`RetrievalPipeline`] is built once at startup and shared by reference;
//! it holds no per-query state.

use crate::passage::Citation;
use crate::rerank::{MmrDiversifier, RerankCandidate, RerankOptions, RerankedCandidate, Reranker};
use crate::retrieval::{
    FusedCandidate, FusionMetrics, FusionSource, HybridSearch, HybridSearchRequest,
};
use docforge_common::config::RetrievalConfig;
use docforge_common::embeddings::EmbeddingProvider;
use docforge_common::errors::{AppError, Result};
use docforge_common::metrics::{self, StageTimer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Pool sizes and diversification for one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(range(min = 1))]
    pub vector_top_k: usize,

    #[validate(range(min = 1))]
    pub lexical_top_k: usize,

    /// Fused candidates handed to the reranker
    #[validate(range(min = 1))]
    pub max_results: usize,

    /// Passages returned to the caller
    #[validate(range(min = 1))]
    pub rerank_top_k: usize,

    #[validate(range(min = 0.0, max = 1.0))]
    pub mmr_lambda: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 50,
            lexical_top_k: 50,
            max_results: 30,
            rerank_top_k: 8,
            mmr_lambda: 0.7,
        }
    }
}

impl From<&RetrievalConfig> for PipelineConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_top_k: config.vector_top_k,
            lexical_top_k: config.lexical_top_k,
            max_results: config.max_results,
            rerank_top_k: config.rerank_top_k,
            mmr_lambda: config.mmr_lambda,
        }
    }
}

/// One cited passage in the answer context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultChunk {
    pub passage_id: Uuid,
    pub text: String,
    /// Combined rerank score; results are ordered by it
    pub score: f32,
    pub source: FusionSource,
    pub citation: Citation,
    /// Fused retrieval score before reranking
    pub retriever_score: f32,
    pub rerank_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmr_score: Option<f32>,
    pub metadata: Map<String, Value>,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalMetadata {
    /// Fused candidates handed to the reranker
    pub total_candidates: usize,
    pub result_count: usize,
    /// Mean result score, 0.0 when there are no results
    pub average_score: f32,
    pub fusion: FusionMetrics,
    pub embedding_model: String,
}

/// Pipeline result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOutput {
    pub query: String,
    pub document_id: Uuid,
    pub results: Vec<ResultChunk>,
    pub metadata: RetrievalMetadata,
}

/// Orchestrates retrieval for single-document questions
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    hybrid: HybridSearch,
    reranker: Reranker,
    config: PipelineConfig,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        hybrid: HybridSearch,
        reranker: Reranker,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        // Range validation lets NaN through
        MmrDiversifier::new(config.mmr_lambda)?;
        Ok(Self {
            embedder,
            hybrid,
            reranker,
            config,
        })
    }

    /// Answer-context retrieval for `query` against one document
    pub async fn run(&self, document_id: Uuid, query: &str) -> Result<PipelineOutput> {
        let timer = StageTimer::start();
        let result = self.run_inner(document_id, query).await;

        match &result {
            Ok(output) => {
                metrics::record_pipeline(timer.elapsed_secs(), output.results.len(), true);
                info!(
                    document_id = %document_id,
                    candidates = output.metadata.total_candidates,
                    results = output.metadata.result_count,
                    average_score = output.metadata.average_score,
                    elapsed_ms = timer.elapsed_ms(),
                    "Retrieval pipeline complete"
                );
            }
            Err(e) => {
                metrics::record_pipeline(timer.elapsed_secs(), 0, false);
                warn!(document_id = %document_id, error = %e, "Retrieval pipeline failed");
            }
        }

        result
    }

    async fn run_inner(&self, document_id: Uuid, query: &str) -> Result<PipelineOutput> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::invalid("query", "must not be blank"));
        }

        let query_embedding = self.embed_query(query).await?;
        let model = self.embedder.model_name().to_string();

        let request = HybridSearchRequest {
            document_id,
            query_text: query.to_string(),
            query_embedding,
            embedding_model: model.clone(),
            vector_top_k: self.config.vector_top_k,
            lexical_top_k: self.config.lexical_top_k,
            max_results: self.config.max_results,
        };
        let response = self.hybrid.search(&request).await?;
        let fused = response.candidates;

        let rerank_input: Vec<RerankCandidate> = fused.iter().map(to_rerank_candidate).collect();
        let reranked = self
            .reranker
            .rerank(
                query,
                rerank_input,
                RerankOptions {
                    top_k: self.config.rerank_top_k,
                    apply_mmr: true,
                    lambda_param: self.config.mmr_lambda,
                },
            )
            .await?;

        let results = assemble_results(document_id, &fused, reranked);
        let average_score = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32
        };

        Ok(PipelineOutput {
            query: query.to_string(),
            document_id,
            metadata: RetrievalMetadata {
                total_candidates: fused.len(),
                result_count: results.len(),
                average_score,
                fusion: response.metrics,
                embedding_model: model,
            },
            results,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let timer = StageTimer::start();
        let model = self.embedder.model_name();

        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                metrics::record_embedding(timer.elapsed_secs(), model, false);
                return Err(e);
            }
        };
        metrics::record_embedding(timer.elapsed_secs(), model, true);

        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(AppError::embedding(format!(
                "{} returned {} dimensions, expected {}",
                model,
                embedding.len(),
                expected
            )));
        }

        debug!(model = model, elapsed_ms = timer.elapsed_ms(), "Query embedded");
        Ok(embedding)
    }
}

fn to_rerank_candidate(candidate: &FusedCandidate) -> RerankCandidate {
    let mut metadata = Map::new();
    metadata.insert("source".into(), json!(candidate.source.as_str()));
    metadata.insert("vector_score".into(), json!(candidate.vector_score));
    metadata.insert("lexical_score".into(), json!(candidate.lexical_score));
    metadata.insert("is_table".into(), json!(candidate.is_table));
    metadata.insert("is_figure".into(), json!(candidate.is_figure));

    RerankCandidate {
        passage_id: candidate.passage_id,
        text: candidate.text.clone(),
        retriever_score: candidate.fused_score,
        embedding: candidate.embedding.clone(),
        metadata,
    }
}

/// Join reranked candidates back to their fused passages.
///
/// Ids missing from `fused` are dropped. The result is ordered by score,
/// ties by fusion order.
fn assemble_results(
    document_id: Uuid,
    fused: &[FusedCandidate],
    reranked: Vec<RerankedCandidate>,
) -> Vec<ResultChunk> {
    let by_id: HashMap<Uuid, (usize, &FusedCandidate)> = fused
        .iter()
        .enumerate()
        .map(|(position, c)| (c.passage_id, (position, c)))
        .collect();

    let mut joined: Vec<(usize, ResultChunk)> = Vec::with_capacity(reranked.len());
    for candidate in reranked {
        let Some(&(position, passage)) = by_id.get(&candidate.passage_id) else {
            warn!(passage_id = %candidate.passage_id, "Reranked passage not among fused candidates, dropping");
            continue;
        };

        joined.push((
            position,
            ResultChunk {
                passage_id: passage.passage_id,
                text: passage.text.clone(),
                score: candidate.combined_score,
                source: passage.source,
                citation: Citation::new(
                    document_id,
                    passage.passage_id,
                    passage.pages,
                    &passage.section_path,
                ),
                retriever_score: candidate.retriever_score,
                rerank_score: candidate.rerank_score,
                mmr_score: candidate.mmr_score,
                metadata: candidate.metadata,
            },
        ));
    }

    joined.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
    joined.into_iter().map(|(_, chunk)| chunk).collect()
}
