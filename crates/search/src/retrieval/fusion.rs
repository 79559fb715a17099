//! Weighted score fusion for combining vector and lexical results
//!
//! Each retriever's batch is min-max normalized onto [0, 1] independently,
//! so cosine similarities and text ranks become comparable:
//! - passage in one list: `weight_of_that_list × normalized`
//! - passage in both:     `w × vector + (1 − w) × lexical`
//!
//! Ordering is fully determined by the inputs: ties keep first-appearance
//! order (vector list first, then lexical-only hits in lexical order).

use super::{FusionMetrics, FusionSource, RetrievalCandidate, RetrievalSource};
use docforge_common::errors::{AppError, Result};
use std::collections::HashMap;
use uuid::Uuid;

/// Min-max normalize a batch onto [0, 1].
///
/// A batch whose scores are all equal maps to 1.0. Non-finite scores map to
/// 0.0 and are ignored when computing the range.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let finite = scores.iter().copied().filter(|s| s.is_finite());
    let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });

    if min > max {
        return vec![0.0; scores.len()];
    }

    let range = max - min;
    scores
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                0.0
            } else if range <= f32::EPSILON {
                1.0
            } else {
                ((s - min) / range).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Fusion parameters
#[derive(Debug, Clone, Copy)]
pub struct WeightedFusion {
    /// Weight for vector results; lexical results get `1 - vector_weight`
    pub vector_weight: f32,
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self { vector_weight: 0.7 }
    }
}

/// One fused passage, before hydration
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub passage_id: Uuid,
    pub fused_score: f32,
    pub source: FusionSource,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

/// Result of fusion
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    /// Sorted by fused score, truncated to `max_results`
    pub scores: Vec<FusedScore>,
    pub metrics: FusionMetrics,
}

impl WeightedFusion {
    /// Create with a validated vector weight
    pub fn new(vector_weight: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&vector_weight) {
            return Err(AppError::invalid(
                "vector_weight",
                format!("must be within [0, 1], got {}", vector_weight),
            ));
        }
        Ok(Self { vector_weight })
    }

    /// Weight applied to a single-source hit
    fn weight_for(&self, source: RetrievalSource) -> f32 {
        match source {
            RetrievalSource::Vector => self.vector_weight,
            RetrievalSource::Lexical => 1.0 - self.vector_weight,
        }
    }

    /// Fuse vector and lexical results; truncation happens only after fusion
    pub fn fuse(
        &self,
        vector_results: &[RetrievalCandidate],
        lexical_results: &[RetrievalCandidate],
        max_results: usize,
    ) -> FusionOutcome {
        let vector_norm = min_max_normalize(
            &vector_results.iter().map(|c| c.raw_score).collect::<Vec<_>>(),
        );
        let lexical_norm = min_max_normalize(
            &lexical_results.iter().map(|c| c.raw_score).collect::<Vec<_>>(),
        );

        // Entries stay in first-appearance order; the map is lookup only
        let mut entries: Vec<FusedScore> =
            Vec::with_capacity(vector_results.len() + lexical_results.len());
        let mut positions: HashMap<Uuid, usize> = HashMap::with_capacity(entries.capacity());

        for (candidate, &normalized) in vector_results.iter().zip(&vector_norm) {
            if positions.contains_key(&candidate.passage_id) {
                continue;
            }
            positions.insert(candidate.passage_id, entries.len());
            entries.push(FusedScore {
                passage_id: candidate.passage_id,
                fused_score: 0.0,
                source: FusionSource::Vector,
                vector_score: Some(normalized),
                lexical_score: None,
            });
        }

        for (candidate, &normalized) in lexical_results.iter().zip(&lexical_norm) {
            match positions.get(&candidate.passage_id) {
                Some(&idx) => {
                    let entry = &mut entries[idx];
                    if entry.lexical_score.is_none() {
                        entry.lexical_score = Some(normalized);
                        entry.source = FusionSource::Both;
                    }
                }
                None => {
                    positions.insert(candidate.passage_id, entries.len());
                    entries.push(FusedScore {
                        passage_id: candidate.passage_id,
                        fused_score: 0.0,
                        source: FusionSource::Lexical,
                        vector_score: None,
                        lexical_score: Some(normalized),
                    });
                }
            }
        }

        let mut metrics = FusionMetrics {
            vector_count: vector_results.len(),
            lexical_count: lexical_results.len(),
            ..FusionMetrics::default()
        };

        for entry in &mut entries {
            entry.fused_score = match (entry.vector_score, entry.lexical_score) {
                (Some(v), Some(l)) => {
                    metrics.overlap_count += 1;
                    self.vector_weight * v + (1.0 - self.vector_weight) * l
                }
                (Some(v), None) => {
                    metrics.vector_only_count += 1;
                    self.weight_for(RetrievalSource::Vector) * v
                }
                (None, Some(l)) => {
                    metrics.lexical_only_count += 1;
                    self.weight_for(RetrievalSource::Lexical) * l
                }
                (None, None) => 0.0,
            };
        }

        metrics.fused_count = entries.len();

        // Stable sort: equal scores keep first-appearance order
        entries.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
        entries.truncate(max_results);
        metrics.final_count = entries.len();

        FusionOutcome {
            scores: entries,
            metrics,
        }
    }
}
