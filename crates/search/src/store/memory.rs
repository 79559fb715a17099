//! In-process passage store
//!
//! Exact cosine similarity for vector queries and Okapi BM25 over an inverted
//! index for text queries. Used for tests, local runs and small corpora.

use super::tokenizer::tokenize;
use super::PassageStore;
use crate::passage::Passage;
use crate::retrieval::{RetrievalCandidate, RetrievalSource};
use crate::similarity::cosine_similarity;
use docforge_common::errors::{AppError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// Term occurrence within one passage
#[derive(Debug, Clone, Copy)]
struct Posting {
    position: usize,
    term_frequency: u32,
}

/// BM25 inverted index over one document's passages
#[derive(Debug, Default)]
struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
    doc_lengths: Vec<u32>,
    total_length: u64,
}

impl InvertedIndex {
    fn add(&mut self, position: usize, text: &str) {
        let tokens = tokenize(text);
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, term_frequency) in frequencies {
            self.postings.entry(term).or_default().push(Posting {
                position,
                term_frequency,
            });
        }

        self.doc_lengths.push(tokens.len() as u32);
        self.total_length += tokens.len() as u64;
    }

    fn average_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.doc_lengths.len() as f32
        }
    }

    /// (position, score) pairs, descending score, ties by position
    fn search(&self, query: &str) -> Vec<(usize, f32)> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || self.doc_lengths.is_empty() {
            return vec![];
        }

        let n = self.doc_lengths.len() as f32;
        let avgdl = self.average_length().max(1.0);
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in postings {
                let dl = self.doc_lengths[posting.position] as f32;
                let tf = posting.term_frequency as f32;
                let tf_norm = (tf * (BM25_K1 + 1.0))
                    / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
                *scores.entry(posting.position).or_insert(0.0) += idf * tf_norm;
            }
        }

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}

/// Everything indexed for one document
#[derive(Debug, Default)]
struct DocumentIndex {
    /// Insertion order
    passages: Vec<Passage>,
    positions: HashMap<Uuid, usize>,
    /// model -> passage id -> embedding
    embeddings: HashMap<String, HashMap<Uuid, Vec<f32>>>,
    text: InvertedIndex,
}

/// Passage store held entirely in memory
#[derive(Debug)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<Uuid, DocumentIndex>>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Index a passage. Its embedding, if any, is stored under `model`.
    pub async fn insert(&self, mut passage: Passage, model: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        let doc = documents.entry(passage.document_id).or_default();

        if doc.positions.contains_key(&passage.id) {
            return Err(AppError::invalid(
                "passage_id",
                format!("passage {} already indexed", passage.id),
            ));
        }

        let position = doc.passages.len();
        if let Some(embedding) = passage.embedding.take() {
            doc.embeddings
                .entry(model.to_string())
                .or_default()
                .insert(passage.id, embedding);
        }

        doc.text.add(position, &passage.text);
        doc.positions.insert(passage.id, position);
        doc.passages.push(passage);
        Ok(())
    }

    /// Attach an embedding for another model to an indexed passage
    pub async fn insert_embedding(
        &self,
        document_id: Uuid,
        passage_id: Uuid,
        model: &str,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(&document_id)
            .filter(|doc| doc.positions.contains_key(&passage_id))
            .ok_or_else(|| {
                AppError::invalid("passage_id", format!("passage {} not indexed", passage_id))
            })?;

        doc.embeddings
            .entry(model.to_string())
            .or_default()
            .insert(passage_id, embedding);
        Ok(())
    }

    /// Simulate an outage; queries fail with `RetrievalUnavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of passages indexed for a document
    pub async fn passage_count(&self, document_id: Uuid) -> usize {
        self.documents
            .read()
            .await
            .get(&document_id)
            .map(|doc| doc.passages.len())
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::unavailable("memory", "store is offline"))
        }
    }
}

#[async_trait::async_trait]
impl PassageStore for InMemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn vector_query(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        self.ensure_available()?;

        let documents = self.documents.read().await;
        let Some(doc) = documents.get(&document_id) else {
            return Ok(vec![]);
        };
        let Some(vectors) = doc.embeddings.get(model) else {
            return Ok(vec![]);
        };

        let mut hits = Vec::with_capacity(vectors.len());
        for passage in &doc.passages {
            let Some(stored) = vectors.get(&passage.id) else {
                continue;
            };
            if stored.len() != embedding.len() {
                return Err(AppError::invalid(
                    "query_embedding",
                    format!(
                        "dimension {} does not match indexed dimension {}",
                        embedding.len(),
                        stored.len()
                    ),
                ));
            }
            hits.push(RetrievalCandidate::new(
                passage.id,
                cosine_similarity(embedding, stored),
                RetrievalSource::Vector,
            ));
        }

        // Stable: equal similarity keeps insertion order
        hits.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn text_query(
        &self,
        document_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        self.ensure_available()?;

        let documents = self.documents.read().await;
        let Some(doc) = documents.get(&document_id) else {
            return Ok(vec![]);
        };

        Ok(doc
            .text
            .search(query)
            .into_iter()
            .take(top_k)
            .map(|(position, score)| {
                RetrievalCandidate::new(doc.passages[position].id, score, RetrievalSource::Lexical)
            })
            .collect())
    }

    async fn fetch_passages(
        &self,
        document_id: Uuid,
        ids: &[Uuid],
        model: &str,
    ) -> Result<Vec<Passage>> {
        self.ensure_available()?;

        let documents = self.documents.read().await;
        let Some(doc) = documents.get(&document_id) else {
            return Ok(vec![]);
        };
        let vectors = doc.embeddings.get(model);

        Ok(ids
            .iter()
            .filter_map(|id| doc.positions.get(id))
            .map(|&position| {
                let mut passage = doc.passages[position].clone();
                passage.embedding = vectors.and_then(|v| v.get(&passage.id)).cloned();
                passage
            })
            .collect())
    }
}
