//! Cross-encoder reranking with optional MMR diversification
//!
//! Candidates arriving here are already fused and truncated; the scorer is
//! invoked once per call with every (query, passage) pair batched.

mod mmr;
mod scorer;

pub use mmr::{MmrDiversifier, MmrItem, MmrSelection};
pub use scorer::{HttpCrossEncoder, RelevanceScorer, TermOverlapScorer};

use docforge_common::config::RetrievalConfig;
use docforge_common::errors::{AppError, Result};
use docforge_common::metrics::{self, StageTimer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Score blending
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankConfig {
    /// `combined = w × rerank + (1 − w) × retriever`; 1.0 uses the rerank score alone
    pub rerank_weight: f32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { rerank_weight: 1.0 }
    }
}

impl From<&RetrievalConfig> for RerankConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            rerank_weight: config.rerank_weight,
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankOptions {
    pub top_k: usize,
    pub apply_mmr: bool,
    pub lambda_param: f32,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            top_k: 8,
            apply_mmr: false,
            lambda_param: 0.7,
        }
    }
}

/// Reranker input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankCandidate {
    pub passage_id: Uuid,
    pub text: String,
    /// Score carried over from retrieval
    pub retriever_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Reranker output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankedCandidate {
    pub passage_id: Uuid,
    pub text: String,
    pub rerank_score: f32,
    /// Ordering key
    pub combined_score: f32,
    pub retriever_score: f32,
    /// Set when MMR selected this candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmr_score: Option<f32>,
    /// Final position, 0-based
    pub rank: usize,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Reranker over an injected relevance scorer
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    config: RerankConfig,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, config: RerankConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.rerank_weight) {
            return Err(AppError::invalid(
                "rerank_weight",
                format!("must be within [0, 1], got {}", config.rerank_weight),
            ));
        }
        Ok(Self { scorer, config })
    }

    /// Score candidates against `query` and return the top `options.top_k`
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        options: RerankOptions,
    ) -> Result<Vec<RerankedCandidate>> {
        if options.top_k < 1 {
            return Err(AppError::invalid("top_k", "must be at least 1"));
        }
        let diversifier = MmrDiversifier::new(options.lambda_param)?;

        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|c| (query.to_string(), c.text.clone()))
            .collect();

        let timer = StageTimer::start();
        let result = self.scorer.predict(&pairs).await;
        let scores = match result {
            Ok(scores) => scores,
            Err(e) => {
                metrics::record_rerank(timer.elapsed_secs(), self.scorer.name(), pairs.len(), false);
                return Err(match e {
                    AppError::ScoringFailure { .. } => e,
                    other => AppError::ScoringFailure {
                        message: other.to_string(),
                        retryable: other.is_retryable(),
                    },
                });
            }
        };

        if let Err(e) = Self::check_scores(&scores, pairs.len()) {
            metrics::record_rerank(timer.elapsed_secs(), self.scorer.name(), pairs.len(), false);
            return Err(e);
        }
        metrics::record_rerank(timer.elapsed_secs(), self.scorer.name(), pairs.len(), true);

        let w = self.config.rerank_weight;
        let scored: Vec<(RerankCandidate, f32, f32)> = candidates
            .into_iter()
            .zip(scores)
            .map(|(c, rerank)| {
                let combined = w * rerank + (1.0 - w) * c.retriever_score;
                (c, rerank, combined)
            })
            .collect();

        let order: Vec<(usize, Option<f32>)> = if options.apply_mmr {
            let items: Vec<MmrItem<'_>> = scored
                .iter()
                .map(|(c, _, combined)| MmrItem {
                    relevance: *combined,
                    embedding: c.embedding.as_deref(),
                })
                .collect();
            diversifier
                .select(&items, options.top_k)?
                .into_iter()
                .map(|s| (s.index, Some(s.mmr_score)))
                .collect()
        } else {
            let mut order: Vec<usize> = (0..scored.len()).collect();
            // Stable: equal scores keep input order
            order.sort_by(|&a, &b| scored[b].2.total_cmp(&scored[a].2));
            order.into_iter().take(options.top_k).map(|i| (i, None)).collect()
        };

        let mut slots: Vec<Option<(RerankCandidate, f32, f32)>> =
            scored.into_iter().map(Some).collect();
        let reranked: Vec<RerankedCandidate> = order
            .into_iter()
            .filter_map(|(index, mmr_score)| {
                slots[index].take().map(|entry| (entry, mmr_score))
            })
            .enumerate()
            .map(|(rank, ((c, rerank_score, combined_score), mmr_score))| RerankedCandidate {
                passage_id: c.passage_id,
                text: c.text,
                rerank_score,
                combined_score,
                retriever_score: c.retriever_score,
                mmr_score,
                rank,
                metadata: c.metadata,
            })
            .collect();

        debug!(
            scorer = self.scorer.name(),
            candidates = pairs.len(),
            returned = reranked.len(),
            mmr = options.apply_mmr,
            elapsed_ms = timer.elapsed_ms(),
            "Rerank complete"
        );

        Ok(reranked)
    }

    fn check_scores(scores: &[f32], expected: usize) -> Result<()> {
        if scores.len() != expected {
            return Err(AppError::scoring(format!(
                "expected {} scores, scorer returned {}",
                expected,
                scores.len()
            )));
        }
        if let Some(pos) = scores.iter().position(|s| !s.is_finite()) {
            return Err(AppError::scoring(format!("non-finite score at position {}", pos)));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("scorer", &self.scorer.name())
            .field("config", &self.config)
            .finish()
    }
}
