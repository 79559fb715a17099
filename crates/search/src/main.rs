//! DocForge Search CLI
//!
//! Runs one retrieval query against an indexed document and prints the
//! cited passages as JSON:
//!
//! ```text
//! search <document-id> <question...>
//! ```

use anyhow::{bail, Context};
use docforge_common::{
    config::AppConfig,
    db::DbPool,
    embeddings::create_embedder,
    metrics::{register_metrics, LATENCY_BUCKETS, MODEL_BUCKETS, METRICS_PREFIX},
    VERSION,
};
use docforge_search::{
    rerank::{HttpCrossEncoder, RelevanceScorer, RerankConfig, TermOverlapScorer},
    HybridConfig, HybridSearch, PgPassageStore, PipelineConfig, Reranker, RetrievalPipeline,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let (Some(document_id), query) = (args.next(), args.collect::<Vec<_>>().join(" ")) else {
        bail!("usage: search <document-id> <question...>");
    };
    let document_id: Uuid = document_id
        .parse()
        .with_context(|| format!("invalid document id: {}", document_id))?;
    if query.trim().is_empty() {
        bail!("usage: search <document-id> <question...>");
    }

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    init_tracing(&config);
    info!(
        service = %config.observability.service_name,
        "Starting DocForge Search v{}",
        VERSION
    );

    if config.observability.metrics_port != 0 {
        init_metrics(config.observability.metrics_port)?;
    }

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    db.ping().await?;
    let db = Arc::new(db);
    let store = Arc::new(PgPassageStore::new(db));

    let embedder = create_embedder(&config.embedding)?;

    let scorer: Arc<dyn RelevanceScorer> = match &config.reranker.endpoint {
        Some(endpoint) => Arc::new(HttpCrossEncoder::new(endpoint.clone(), &config.reranker)?),
        None => {
            info!("No reranker endpoint configured, using term overlap scoring");
            Arc::new(TermOverlapScorer)
        }
    };

    let retrieval = &config.retrieval;
    let pipeline = RetrievalPipeline::new(
        embedder,
        HybridSearch::new(store, HybridConfig::from(retrieval))?,
        Reranker::new(scorer, RerankConfig::from(retrieval))?,
        PipelineConfig::from(retrieval),
    )?;

    let output = pipeline.run(document_id, &query).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    // Logs go to stderr so stdout stays valid JSON
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), MODEL_BUCKETS)?
        .install()
        .context("failed to install Prometheus exporter")?;

    register_metrics();
    info!("Metrics exporter listening on port {}", port);
    Ok(())
}
