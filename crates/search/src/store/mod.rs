//! Passage storage backends
//!
//! The retrievers only ever read through [`PassageStore`]. Two backends exist:
//! - [`PgPassageStore`]: PostgreSQL with pgvector and a `tsvector` column
//! - [`InMemoryStore`]: exact cosine and BM25 over an in-process index

mod memory;
mod postgres;
mod tokenizer;

pub use memory::InMemoryStore;
pub use postgres::PgPassageStore;
pub use tokenizer::tokenize;

use crate::passage::Passage;
use crate::retrieval::RetrievalCandidate;
use docforge_common::errors::Result;
use uuid::Uuid;

/// Read access to a document's indexed passages
#[async_trait::async_trait]
pub trait PassageStore: Send + Sync {
    /// Backend name used in logs and `RetrievalUnavailable` errors
    fn backend(&self) -> &str;

    /// Passages of `document_id` with an embedding for `model`, by descending
    /// cosine similarity to `embedding`
    async fn vector_query(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>>;

    /// Passages of `document_id` matching `query`, by descending text rank
    async fn text_query(
        &self,
        document_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>>;

    /// Load passages by id, in request order. Unknown ids are skipped.
    /// The embedding for `model` is attached when one exists.
    async fn fetch_passages(
        &self,
        document_id: Uuid,
        ids: &[Uuid],
        model: &str,
    ) -> Result<Vec<Passage>>;
}
