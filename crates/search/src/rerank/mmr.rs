//! Maximal Marginal Relevance selection
//!
//! Greedily picks items maximizing
//! `λ × relevance − (1 − λ) × max similarity to already selected items`.

use crate::similarity::cosine_similarity;
use docforge_common::errors::{AppError, Result};
use tracing::debug;

/// One scored item of the pool
#[derive(Debug, Clone, Copy)]
pub struct MmrItem<'a> {
    pub relevance: f32,
    pub embedding: Option<&'a [f32]>,
}

/// One selection step: the chosen item's input index and its MMR score at that step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrSelection {
    pub index: usize,
    pub mmr_score: f32,
}

/// MMR diversifier with a fixed relevance/novelty trade-off
#[derive(Debug, Clone, Copy)]
pub struct MmrDiversifier {
    lambda: f32,
}

impl MmrDiversifier {
    /// `lambda` must be in [0, 1]: 1.0 is pure relevance, 0.0 pure diversity
    pub fn new(lambda: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&lambda) {
            return Err(AppError::invalid(
                "lambda_param",
                format!("must be within [0, 1], got {}", lambda),
            ));
        }
        Ok(Self { lambda })
    }

    /// Select up to `top_k` items in greedy MMR order.
    ///
    /// Ties go to the higher relevance, then the lower input index. If any
    /// item lacks a usable embedding, the pool is ordered by relevance alone.
    pub fn select(&self, items: &[MmrItem<'_>], top_k: usize) -> Result<Vec<MmrSelection>> {
        if top_k < 1 {
            return Err(AppError::invalid("top_k", "must be at least 1"));
        }
        if items.is_empty() {
            return Ok(vec![]);
        }

        if !Self::embeddings_usable(items) {
            debug!(pool = items.len(), "Missing or mismatched embeddings, MMR falls back to relevance order");
            return Ok(self.relevance_only(items, top_k));
        }

        let mut remaining: Vec<usize> = (0..items.len()).collect();
        // Max similarity of each item to the selected set; None while nothing is selected
        let mut max_sim: Vec<Option<f32>> = vec![None; items.len()];
        let mut selected = Vec::with_capacity(top_k.min(items.len()));

        while selected.len() < top_k && !remaining.is_empty() {
            let mut best: Option<(usize, f32)> = None;

            for (slot, &idx) in remaining.iter().enumerate() {
                let score = self.mmr_score(items[idx].relevance, max_sim[idx].unwrap_or(0.0));
                let better = match best {
                    None => true,
                    Some((best_slot, best_score)) => {
                        Self::prefer(items, idx, score, remaining[best_slot], best_score)
                    }
                };
                if better {
                    best = Some((slot, score));
                }
            }

            let Some((slot, mmr_score)) = best else {
                break;
            };
            let chosen = remaining.remove(slot);
            selected.push(MmrSelection {
                index: chosen,
                mmr_score,
            });

            // Checked non-empty above
            let chosen_embedding = items[chosen].embedding.unwrap_or_default();
            for &idx in &remaining {
                let other = items[idx].embedding.unwrap_or_default();
                let sim = cosine_similarity(chosen_embedding, other);
                max_sim[idx] = Some(max_sim[idx].map_or(sim, |current| current.max(sim)));
            }
        }

        Ok(selected)
    }

    fn mmr_score(&self, relevance: f32, max_similarity: f32) -> f32 {
        self.lambda * relevance - (1.0 - self.lambda) * max_similarity
    }

    /// Whether `(candidate, score)` beats `(incumbent, best_score)`
    fn prefer(
        items: &[MmrItem<'_>],
        candidate: usize,
        score: f32,
        incumbent: usize,
        best_score: f32,
    ) -> bool {
        score
            .total_cmp(&best_score)
            .then(items[candidate].relevance.total_cmp(&items[incumbent].relevance))
            .then(incumbent.cmp(&candidate))
            .is_gt()
    }

    /// All embeddings present, non-empty and of one dimension
    fn embeddings_usable(items: &[MmrItem<'_>]) -> bool {
        let mut dimension = None;
        for item in items {
            match item.embedding {
                Some(e) if !e.is_empty() => match dimension {
                    None => dimension = Some(e.len()),
                    Some(d) if d != e.len() => return false,
                    Some(_) => {}
                },
                _ => return false,
            }
        }
        true
    }

    fn relevance_only(&self, items: &[MmrItem<'_>], top_k: usize) -> Vec<MmrSelection> {
        let mut order: Vec<usize> = (0..items.len()).collect();
        // Stable: equal relevance keeps input order
        order.sort_by(|&a, &b| items[b].relevance.total_cmp(&items[a].relevance));
        order
            .into_iter()
            .take(top_k)
            .map(|index| MmrSelection {
                index,
                mmr_score: self.lambda * items[index].relevance,
            })
            .collect()
    }
}
