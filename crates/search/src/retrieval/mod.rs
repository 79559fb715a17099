//! Multi-strategy retrieval
//!
//! Provides three retrieval modes over a single document's passages:
//! - Vector search (semantic similarity via embeddings)
//! - Lexical search (indexed full-text ranking)
//! - Hybrid search (min-max normalized, weighted fusion of both)

mod fusion;
mod hybrid;
mod lexical;
mod vector;

pub use fusion::{min_max_normalize, FusedScore, FusionOutcome, WeightedFusion};
pub use hybrid::{HybridConfig, HybridSearch, HybridSearchRequest, HybridSearchResponse};
pub use lexical::LexicalSearch;
pub use vector::VectorSearch;

use crate::passage::PageRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Retriever that produced a raw candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    /// Vector similarity search
    Vector,
    /// Full-text lexical search
    Lexical,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::Vector => "vector",
            RetrievalSource::Lexical => "lexical",
        }
    }
}

/// Raw, per-retriever hit. Scores are only comparable within one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalCandidate {
    pub passage_id: Uuid,
    pub raw_score: f32,
    pub source: RetrievalSource,
}

impl RetrievalCandidate {
    pub fn new(passage_id: Uuid, raw_score: f32, source: RetrievalSource) -> Self {
        Self { passage_id, raw_score, source }
    }
}

/// Origin of a fused candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FusionSource {
    Vector,
    Lexical,
    /// Returned by both retrievers
    Both,
}

impl FusionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionSource::Vector => "vector",
            FusionSource::Lexical => "lexical",
            FusionSource::Both => "both",
        }
    }
}

impl From<RetrievalSource> for FusionSource {
    fn from(source: RetrievalSource) -> Self {
        match source {
            RetrievalSource::Vector => FusionSource::Vector,
            RetrievalSource::Lexical => FusionSource::Lexical,
        }
    }
}

impl fmt::Display for FusionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a hybrid search response; at most one per passage id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedCandidate {
    pub passage_id: Uuid,

    pub text: String,

    /// Weighted combination of the normalized retriever scores (0.0 - 1.0)
    pub fused_score: f32,

    pub source: FusionSource,

    pub pages: PageRange,

    pub section_path: Vec<String>,

    pub is_table: bool,

    pub is_figure: bool,

    /// Min-max normalized vector score, when the vector retriever returned it
    pub vector_score: Option<f32>,

    /// Min-max normalized lexical score, when the lexical retriever returned it
    pub lexical_score: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Overlap accounting for one hybrid search
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FusionMetrics {
    /// Raw candidates returned by the vector retriever
    pub vector_count: usize,
    /// Raw candidates returned by the lexical retriever
    pub lexical_count: usize,
    pub vector_only_count: usize,
    pub lexical_only_count: usize,
    pub overlap_count: usize,
    /// Distinct passages before truncation
    pub fused_count: usize,
    /// Candidates actually returned
    pub final_count: usize,
}
