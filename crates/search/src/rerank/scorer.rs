//! Relevance scorers
//!
//! A scorer jointly scores (query, passage) pairs. The reranker calls
//! [`RelevanceScorer::predict`] once per rerank with every pair batched.

use crate::store::tokenize;
use async_trait::async_trait;
use docforge_common::config::RerankerConfig;
use docforge_common::errors::{AppError, Result};
use docforge_common::retry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Joint (query, passage) relevance model
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score every pair; output is positional and must match `pairs` in length
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;

    /// Scorer name for logs and metrics
    fn name(&self) -> &str;
}

/// Cross-encoder served over HTTP
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    model: &'a str,
    pairs: Vec<[&'a str; 2]>,
}

#[derive(Deserialize)]
struct PredictResponse {
    scores: Vec<f32>,
}

impl HttpCrossEncoder {
    /// Create a client for `endpoint` using the reranker settings
    pub fn new(endpoint: impl Into<String>, config: &RerankerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        retry::with_backoff("cross_encoder", self.max_retries, || self.make_request(pairs)).await
    }

    async fn make_request(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let request = PredictRequest {
            model: &self.model,
            pairs: pairs.iter().map(|(q, p)| [q.as_str(), p.as_str()]).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::scoring_transient(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("Scoring API error {}: {}", status, body);
            return Err(if retry::is_transient_status(status) {
                AppError::scoring_transient(message)
            } else {
                AppError::scoring(message)
            });
        }

        let result: PredictResponse = response
            .json()
            .await
            .map_err(|e| AppError::scoring(format!("Failed to parse response: {}", e)))?;

        Ok(result.scores)
    }
}

#[async_trait]
impl RelevanceScorer for HttpCrossEncoder {
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }
        self.request_with_retry(pairs).await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Model-free scorer: fraction of distinct query terms present in the passage
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapScorer;

impl TermOverlapScorer {
    fn overlap(query: &str, passage: &str) -> f32 {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage_terms: HashSet<String> = tokenize(passage).into_iter().collect();
        let matches = query_terms.intersection(&passage_terms).count();
        matches as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl RelevanceScorer for TermOverlapScorer {
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(query, passage)| Self::overlap(query, passage))
            .collect())
    }

    fn name(&self) -> &str {
        "term-overlap"
    }
}
