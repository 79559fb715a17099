//! Metrics and observability utilities
//!
//! Provides Prometheus-compatible metrics (via the `metrics` facade) with
//! SLO-aligned histograms and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DocForge metrics
pub const METRICS_PREFIX: &str = "docforge";

/// SLO-aligned histogram buckets for retrieval latency (in seconds)
/// Targets: lexical < 50ms, vector < 100ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - lexical target
    0.075,  // 75ms
    0.100,  // 100ms - vector target
    0.150,  // 150ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Buckets for model calls (embedding and cross-encoder, typically slower)
pub const MODEL_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total retriever invocations by stage"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retriever latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of candidates returned by the last retriever call"
    );

    describe_counter!(
        format!("{}_fusion_candidates_total", METRICS_PREFIX),
        Unit::Count,
        "Fused candidates by origin (vector_only, lexical_only, overlap)"
    );

    describe_counter!(
        format!("{}_rerank_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Cross-encoder scoring calls"
    );

    describe_histogram!(
        format!("{}_rerank_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Cross-encoder scoring latency in seconds"
    );

    describe_histogram!(
        format!("{}_rerank_batch_size", METRICS_PREFIX),
        Unit::Count,
        "Pairs scored per cross-encoder call"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Query embedding requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Query embedding latency in seconds"
    );

    describe_counter!(
        format!("{}_pipeline_queries_total", METRICS_PREFIX),
        Unit::Count,
        "End-to-end retrieval pipeline runs"
    );

    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end retrieval pipeline latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Wall-clock timer for one pipeline stage
pub struct StageTimer {
    start: Instant,
}

impl StageTimer {
    /// Start timing
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Seconds elapsed since start
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Milliseconds elapsed since start
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Helper to record retriever metrics
pub fn record_retrieval(stage: &str, duration_secs: f64, result_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record fusion overlap counts
pub fn record_fusion(vector_only: usize, lexical_only: usize, overlap: usize) {
    for (origin, count) in [
        ("vector_only", vector_only),
        ("lexical_only", lexical_only),
        ("overlap", overlap),
    ] {
        counter!(
            format!("{}_fusion_candidates_total", METRICS_PREFIX),
            "origin" => origin
        )
        .increment(count as u64);
    }
}

/// Helper to record cross-encoder metrics
pub fn record_rerank(duration_secs: f64, scorer: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_rerank_requests_total", METRICS_PREFIX),
        "scorer" => scorer.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_rerank_duration_seconds", METRICS_PREFIX),
        "scorer" => scorer.to_string()
    )
    .record(duration_secs);

    histogram!(format!("{}_rerank_batch_size", METRICS_PREFIX)).record(batch_size as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record end-to-end pipeline metrics
pub fn record_pipeline(duration_secs: f64, result_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_pipeline_queries_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(format!("{}_pipeline_duration_seconds", METRICS_PREFIX))
        .record(duration_secs);

    gauge!(format!("{}_pipeline_results_count", METRICS_PREFIX)).set(result_count as f64);
}
