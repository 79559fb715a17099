//! DocForge Search
//!
//! Retrieval core for single-document question answering:
//! - Vector similarity search over per-model passage embeddings
//! - Indexed lexical search
//! - Hybrid search with min-max normalized weighted fusion
//! - Cross-encoder reranking with MMR diversification
//! - A pipeline tying them together with page/section citations

pub mod passage;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod similarity;
pub mod store;

pub use passage::{Citation, PageRange, Passage};
pub use pipeline::{PipelineConfig, PipelineOutput, ResultChunk, RetrievalMetadata, RetrievalPipeline};
pub use rerank::{RelevanceScorer, Reranker};
pub use retrieval::{HybridConfig, HybridSearch};
pub use store::{InMemoryStore, PassageStore, PgPassageStore};
