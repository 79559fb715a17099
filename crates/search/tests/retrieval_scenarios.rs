use async_trait::async_trait;
use docforge_common::errors::{AppError, Result};
use docforge_search::rerank::{RelevanceScorer, RerankCandidate, RerankConfig, RerankOptions, Reranker};
use docforge_search::retrieval::{
    FusionSource, HybridConfig, HybridSearch, HybridSearchRequest, LexicalSearch, RetrievalCandidate,
    VectorSearch,
};
use docforge_search::{InMemoryStore, PageRange, Passage, PassageStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

const MODEL: &str = "scenario-model";

const VOCABULARY: &[&str] = &[
    "apoptosis", "kinase", "receptor", "pathway", "expression", "tumour", "cohort", "survival",
    "methylation", "promoter", "signalling", "inhibitor", "mutation", "variant", "sequencing",
    "biopsy", "marker", "transcript", "protein", "cell", "dose", "response", "trial", "cancer",
    "genome", "allele", "phenotype", "clinical", "regression", "analysis",
];

fn passage(doc: Uuid, id: u128, text: impl Into<String>, embedding: Option<Vec<f32>>) -> Passage {
    Passage {
        id: Uuid::from_u128(id),
        document_id: doc,
        text: text.into(),
        pages: PageRange::single((id % 400) as u32 + 1),
        section_path: vec!["Results".to_string()],
        embedding,
        is_table: false,
        is_figure: false,
    }
}

fn random_text(rng: &mut StdRng, words: usize) -> String {
    (0..words)
        .filter_map(|_| VOCABULARY.choose(rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_embedding(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Store of `size` random passages with 8-dimensional embeddings
async fn random_corpus(doc: Uuid, size: u128, seed: u64) -> Arc<InMemoryStore> {
    let mut rng = StdRng::seed_from_u64(seed);
    let store = Arc::new(InMemoryStore::new());
    for id in 1..=size {
        let text = random_text(&mut rng, 12);
        let embedding = random_embedding(&mut rng, 8);
        store.insert(passage(doc, id, text, Some(embedding)), MODEL).await.unwrap();
    }
    store
}

/// Scorer returning fixed scores and counting invocations
struct CountingScorer {
    scores: Option<Vec<f32>>,
    calls: AtomicUsize,
}

impl CountingScorer {
    fn fixed(scores: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            scores: Some(scores),
            calls: AtomicUsize::new(0),
        })
    }

    /// Scores each pair by the length of its passage text
    fn by_length() -> Arc<Self> {
        Arc::new(Self {
            scores: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelevanceScorer for CountingScorer {
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.scores {
            Some(scores) => scores.clone(),
            None => pairs.iter().map(|(_, p)| 1.0 / (1.0 + p.len() as f32)).collect(),
        })
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Which retriever a [`PartialOutage`] store fails
#[derive(Clone, Copy)]
enum Down {
    Vector,
    Lexical,
}

/// Store with one query path offline; hydration still works
struct PartialOutage {
    inner: Arc<InMemoryStore>,
    down: Down,
}

#[async_trait]
impl PassageStore for PartialOutage {
    fn backend(&self) -> &str {
        "flaky"
    }

    async fn vector_query(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        match self.down {
            Down::Vector => Err(AppError::unavailable("flaky", "vector index offline")),
            Down::Lexical => self.inner.vector_query(document_id, embedding, model, top_k).await,
        }
    }

    async fn text_query(&self, document_id: Uuid, query: &str, top_k: usize) -> Result<Vec<RetrievalCandidate>> {
        match self.down {
            Down::Lexical => Err(AppError::unavailable("flaky", "text index offline")),
            Down::Vector => self.inner.text_query(document_id, query, top_k).await,
        }
    }

    async fn fetch_passages(&self, document_id: Uuid, ids: &[Uuid], model: &str) -> Result<Vec<Passage>> {
        self.inner.fetch_passages(document_id, ids, model).await
    }
}

fn degrading() -> HybridConfig {
    HybridConfig {
        degrade_on_partial_failure: true,
        ..HybridConfig::default()
    }
}

fn candidate(id: u128, embedding: Option<Vec<f32>>) -> RerankCandidate {
    RerankCandidate {
        passage_id: Uuid::from_u128(id),
        text: format!("candidate {}", id),
        retriever_score: 0.5,
        embedding,
        metadata: serde_json::Map::new(),
    }
}

fn hybrid_request(doc: Uuid, query: &str, embedding: Vec<f32>, max_results: usize) -> HybridSearchRequest {
    HybridSearchRequest {
        document_id: doc,
        query_text: query.to_string(),
        query_embedding: embedding,
        embedding_model: MODEL.to_string(),
        vector_top_k: 40,
        lexical_top_k: 40,
        max_results,
    }
}

#[tokio::test]
async fn mmr_suppresses_near_duplicate() {
    let scorer = CountingScorer::fixed(vec![0.95, 0.94, 0.60]);
    let reranker = Reranker::new(scorer, RerankConfig::default()).unwrap();
    let input = vec![
        candidate(1, Some(vec![1.0, 0.0, 0.0])),
        candidate(2, Some(vec![0.9, 0.1, 0.0])),
        candidate(3, Some(vec![0.0, 1.0, 0.0])),
    ];

    let out = reranker
        .rerank(
            "query",
            input,
            RerankOptions {
                top_k: 2,
                apply_mmr: true,
                lambda_param: 0.7,
            },
        )
        .await
        .unwrap();

    let ids: Vec<Uuid> = out.iter().map(|c| c.passage_id).collect();
    assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
}

#[tokio::test]
async fn mmr_rewards_opposite_embedding() {
    let scorer = CountingScorer::fixed(vec![1.0, 0.5, 0.52]);
    let reranker = Reranker::new(scorer, RerankConfig::default()).unwrap();
    let input = vec![
        candidate(1, Some(vec![1.0, 0.0])),
        candidate(2, Some(vec![-1.0, 0.0])),
        candidate(3, Some(vec![0.0, 1.0])),
    ];

    let out = reranker
        .rerank(
            "query",
            input,
            RerankOptions {
                top_k: 2,
                apply_mmr: true,
                lambda_param: 0.5,
            },
        )
        .await
        .unwrap();

    let ids: Vec<Uuid> = out.iter().map(|c| c.passage_id).collect();
    assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
    let mmr = out[1].mmr_score.unwrap();
    assert!((mmr - 0.75).abs() < 1e-6);
}

#[tokio::test]
async fn lexical_tp53_ranks_only_match_first() {
    let doc = Uuid::from_u128(1);
    let store = Arc::new(InMemoryStore::new());
    for p in [
        passage(doc, 1, "Cell cycle regulation in epithelial tissue", None),
        passage(doc, 2, "TP53 loss of function drives genomic instability", None),
        passage(doc, 3, "Survival analysis of the treatment cohort", None),
    ] {
        store.insert(p, MODEL).await.unwrap();
    }
    let lexical = LexicalSearch::new(store);

    let started = Instant::now();
    let hits = lexical.search(doc, "TP53", 3).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(hits[0].passage_id, Uuid::from_u128(2));
    assert!(elapsed < Duration::from_millis(50), "took {:?}", elapsed);
}

#[tokio::test]
async fn lexical_latency_on_large_document() {
    let doc = Uuid::from_u128(2);
    let store = random_corpus(doc, 20_000, 7).await;
    store
        .insert(passage(doc, 50_000, "TP53 R175H hotspot mutation", None), MODEL)
        .await
        .unwrap();
    let lexical = LexicalSearch::new(store);

    let started = Instant::now();
    let hits = lexical.search(doc, "TP53 hotspot", 10).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].passage_id, Uuid::from_u128(50_000));
    assert!(elapsed < Duration::from_millis(50), "took {:?}", elapsed);

    // Both terms occur in thousands of passages
    let started = Instant::now();
    let hits = lexical.search(doc, "protein kinase", 10).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(hits.len(), 10);
    assert!(hits.windows(2).all(|w| w[0].raw_score >= w[1].raw_score));
    assert!(elapsed < Duration::from_millis(50), "took {:?}", elapsed);
}

#[tokio::test]
async fn vector_order_matches_expected() {
    let doc = Uuid::from_u128(3);
    let store = Arc::new(InMemoryStore::new());
    for p in [
        passage(doc, 1, "a", Some(vec![0.0, 0.0, 1.0])),
        passage(doc, 2, "b", Some(vec![0.6, 0.8, 0.0])),
        passage(doc, 3, "c", Some(vec![1.0, 0.0, 0.0])),
    ] {
        store.insert(p, MODEL).await.unwrap();
    }
    let vector = VectorSearch::new(store);

    let started = Instant::now();
    let hits = vector.search(doc, &[0.9, 0.3, 0.1], MODEL, 3).await.unwrap();
    let elapsed = started.elapsed();

    let ids: Vec<u128> = hits.iter().map(|h| h.passage_id.as_u128()).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert!(hits.windows(2).all(|w| w[0].raw_score >= w[1].raw_score));
    assert!(elapsed < Duration::from_millis(100), "took {:?}", elapsed);
}

#[tokio::test]
async fn hybrid_results_are_unique_and_counts_add_up() {
    let doc = Uuid::from_u128(4);
    let store = random_corpus(doc, 300, 11).await;
    let hybrid = HybridSearch::new(store, HybridConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..10 {
        let query = random_text(&mut rng, 3);
        let embedding = random_embedding(&mut rng, 8);
        let response = hybrid
            .search(&hybrid_request(doc, &query, embedding, 1_000))
            .await
            .unwrap();

        let ids: HashSet<Uuid> = response.candidates.iter().map(|c| c.passage_id).collect();
        assert_eq!(ids.len(), response.candidates.len());

        let m = response.metrics;
        assert_eq!(m.overlap_count + m.vector_only_count + m.lexical_only_count, m.final_count);
        assert!(response
            .candidates
            .windows(2)
            .all(|w| w[0].fused_score >= w[1].fused_score));
    }
}

#[tokio::test]
async fn hybrid_truncates_after_fusion() {
    let doc = Uuid::from_u128(5);
    let store = random_corpus(doc, 200, 5).await;
    let hybrid = HybridSearch::new(store, HybridConfig::default()).unwrap();

    let response = hybrid
        .search(&hybrid_request(doc, "kinase inhibitor", vec![0.5; 8], 5))
        .await
        .unwrap();
    assert_eq!(response.candidates.len(), 5);
    assert_eq!(response.metrics.final_count, 5);
    assert!(response.metrics.fused_count > 5);
    // The best vector hit normalizes to 1.0 and scores at least 0.7
    assert!(response.candidates[0].fused_score >= 0.7 - 1e-6);
}

#[tokio::test]
async fn partial_failure_policy_lexical_down() {
    let doc = Uuid::from_u128(6);
    let inner = random_corpus(doc, 50, 3).await;
    let flaky: Arc<dyn PassageStore> = Arc::new(PartialOutage {
        inner,
        down: Down::Lexical,
    });

    let strict = HybridSearch::new(flaky.clone(), HybridConfig::default()).unwrap();
    let request = hybrid_request(doc, "protein", vec![0.1; 8], 10);
    let err = assert_err!(strict.search(&request).await);
    assert!(matches!(err, AppError::RetrievalUnavailable { .. }));

    let lenient = HybridSearch::new(flaky, degrading()).unwrap();
    let response = assert_ok!(lenient.search(&request).await);
    assert_eq!(response.candidates.len(), 10);
    assert!(response.candidates.iter().all(|c| c.source == FusionSource::Vector));
}

#[tokio::test]
async fn partial_failure_policy_vector_down() {
    let doc = Uuid::from_u128(7);
    let inner = random_corpus(doc, 50, 4).await;
    inner
        .insert(passage(doc, 900, "TP53 protein stability", None), MODEL)
        .await
        .unwrap();
    let flaky: Arc<dyn PassageStore> = Arc::new(PartialOutage {
        inner,
        down: Down::Vector,
    });

    let strict = HybridSearch::new(flaky.clone(), HybridConfig::default()).unwrap();
    let request = hybrid_request(doc, "TP53", vec![0.1; 8], 10);
    let err = assert_err!(strict.search(&request).await);
    assert!(matches!(err, AppError::RetrievalUnavailable { .. }));

    let lenient = HybridSearch::new(flaky, degrading()).unwrap();
    let response = assert_ok!(lenient.search(&request).await);
    assert_eq!(response.candidates.len(), 1);
    let only = &response.candidates[0];
    assert_eq!(only.passage_id, Uuid::from_u128(900));
    assert_eq!(only.source, FusionSource::Lexical);
    assert!(only.vector_score.is_none());
    assert_eq!(response.metrics.vector_count, 0);
    assert_eq!(response.metrics.lexical_only_count, 1);
}

#[tokio::test]
async fn scorer_invoked_once_per_rerank() {
    let scorer = CountingScorer::by_length();
    let reranker = Reranker::new(scorer.clone(), RerankConfig::default()).unwrap();

    for (round, size) in [1_u128, 7, 40].into_iter().enumerate() {
        let input: Vec<RerankCandidate> = (0..size).map(|i| candidate(i, None)).collect();
        reranker
            .rerank(
                "query",
                input,
                RerankOptions {
                    top_k: 5,
                    apply_mmr: round % 2 == 0,
                    lambda_param: 0.5,
                },
            )
            .await
            .unwrap();
        assert_eq!(scorer.calls(), round + 1);
    }
}

#[tokio::test]
async fn mmr_with_lambda_one_matches_plain_ordering() {
    let mut rng = StdRng::seed_from_u64(21);
    // Coarse scores so ties actually occur
    let scores: Vec<f32> = (0..20).map(|_| rng.gen_range(0..5) as f32 / 4.0).collect();
    let input: Vec<RerankCandidate> = (0..20)
        .map(|i| candidate(i, Some(random_embedding(&mut rng, 4))))
        .collect();

    let scorer = CountingScorer::fixed(scores);
    let reranker = Reranker::new(scorer, RerankConfig::default()).unwrap();
    let options = |apply_mmr| RerankOptions {
        top_k: 10,
        apply_mmr,
        lambda_param: 1.0,
    };

    let plain = reranker.rerank("q", input.clone(), options(false)).await.unwrap();
    let mmr = reranker.rerank("q", input, options(true)).await.unwrap();

    let plain_ids: Vec<Uuid> = plain.iter().map(|c| c.passage_id).collect();
    let mmr_ids: Vec<Uuid> = mmr.iter().map(|c| c.passage_id).collect();
    assert_eq!(plain_ids, mmr_ids);
}

#[tokio::test]
async fn single_candidate_round_trip() {
    let scorer = CountingScorer::fixed(vec![0.42]);
    let reranker = Reranker::new(scorer, RerankConfig::default()).unwrap();
    let input = candidate(9, Some(vec![0.3, 0.4]));

    let out = reranker
        .rerank(
            "query",
            vec![input.clone()],
            RerankOptions {
                top_k: 1,
                apply_mmr: true,
                lambda_param: 0.7,
            },
        )
        .await
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].rank, 0);
    assert_eq!(out[0].passage_id, input.passage_id);
    assert_eq!(out[0].text, input.text);
    assert_eq!(out[0].retriever_score, input.retriever_score);
    assert_eq!(out[0].metadata, input.metadata);
}
