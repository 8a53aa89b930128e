//! Fraud Case Engine - Main Entry Point
//!
//! Receives transaction batches over NATS, publishes the fraud cases found in
//! them, and answers case summary requests.

use anyhow::Result;
use async_nats::{Message, Subject};
use fraud_case_engine::{
    config::AppConfig,
    consumer::RequestConsumer,
    engine::{AnalysisReport, DetectionEngine},
    error::EngineError,
    feature_extractor::FEATURE_SCHEMA_VERSION,
    metrics::{MetricsReporter, PipelineMetrics, SummaryOutcome},
    producer::CaseProducer,
    types::case::{Case, RiskLevelThresholds, SummarySource},
    Transaction,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config)?;

    info!("Starting Fraud Case Engine");
    info!(
        "Detection: {} trees, contamination {:.3}, seed {}, normalization {:?}",
        config.detection.n_trees,
        config.detection.contamination,
        config.detection.seed,
        config.detection.normalization
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let engine = Arc::new(DetectionEngine::from_config(&config)?);
    info!(
        schema_version = FEATURE_SCHEMA_VERSION,
        features = ?engine.feature_names(),
        summary_backend = engine.has_summary_backend(),
        "Detection engine initialized"
    );

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats);
    let producer = Arc::new(CaseProducer::new(client.clone(), &config.nats.case_subject));
    let mut batches = consumer.subscribe_batches().await?;
    let mut summaries = consumer.subscribe_summaries().await?;
    info!(
        "Listening for batches on {}, summary requests on {}",
        consumer.batch_subject(),
        consumer.summary_subject()
    );

    let num_workers = config.pipeline.workers.max(1);
    info!(
        "Processing with {} parallel workers, publishing cases to {}",
        num_workers,
        producer.subject()
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let thresholds = Arc::new(config.detection.risk_levels.clone());

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    loop {
        tokio::select! {
            Some(message) = batches.next() => {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let engine = engine.clone();
                let producer = producer.clone();
                let metrics = metrics.clone();
                let thresholds = thresholds.clone();

                tokio::spawn(async move {
                    handle_batch(message, engine, producer, metrics, thresholds).await;
                    drop(permit);
                });
            }
            Some(message) = summaries.next() => {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let engine = engine.clone();
                let producer = producer.clone();
                let metrics = metrics.clone();

                tokio::spawn(async move {
                    handle_summary_request(message, engine, producer, metrics).await;
                    drop(permit);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            else => break,
        }
    }

    info!("Engine shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fraud_case_engine={}", config.logging.level).parse()?);

    if config.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn handle_batch(
    message: Message,
    engine: Arc<DetectionEngine>,
    producer: Arc<CaseProducer>,
    metrics: Arc<PipelineMetrics>,
    thresholds: Arc<RiskLevelThresholds>,
) {
    let start_time = Instant::now();

    let reply = message.reply;

    let transactions: Vec<Transaction> = match serde_json::from_slice(&message.payload) {
        Ok(transactions) => transactions,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize transaction batch");
            reply_error(&producer, reply, &format!("invalid batch: {}", e)).await;
            return;
        }
    };

    // Scoring is CPU-bound; keep it off the async workers
    let analysis =
        tokio::task::spawn_blocking(move || engine.analyze_with_report(&transactions)).await;

    let (cases, report) = match analysis_outcome(analysis) {
        Ok(result) => result,
        Err(message) => {
            reply_error(&producer, reply, &message).await;
            return;
        }
    };

    let processing_time = start_time.elapsed();
    metrics.record_batch(processing_time, &report);
    for case in &cases {
        metrics.record_case(case.risk_score, case.risk_level(&thresholds));
    }

    let published = producer.publish_batch(&cases).await;
    if let Some(reply) = reply {
        if let Err(e) = producer.reply(reply, &cases).await {
            error!(error = %e, "Failed to reply with cases");
        }
    }

    if cases.is_empty() {
        debug!(
            transactions = report.transactions,
            processing_time_us = processing_time.as_micros() as u64,
            "Batch processed (no cases)"
        );
    } else {
        info!(
            transactions = report.transactions,
            anomalies = report.anomalies,
            cases = cases.len(),
            published,
            processing_time_us = processing_time.as_micros() as u64,
            "Fraud cases published"
        );
    }
}

async fn handle_summary_request(
    message: Message,
    engine: Arc<DetectionEngine>,
    producer: Arc<CaseProducer>,
    metrics: Arc<PipelineMetrics>,
) {
    let Some(reply) = message.reply else {
        warn!("Summary request without reply subject ignored");
        return;
    };

    let case: Case = match serde_json::from_slice(&message.payload) {
        Ok(case) => case,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize case");
            reply_error(&producer, Some(reply), &format!("invalid case: {}", e)).await;
            return;
        }
    };

    let sent = match engine.summarize(&case).await {
        Ok(summary) => {
            metrics.record_summary(match summary.source {
                SummarySource::Generated => SummaryOutcome::Generated,
                SummarySource::Fallback => SummaryOutcome::Fallback,
            });
            info!(case_id = %case.case_id, source = ?summary.source, "Case summarized");
            producer.reply(reply, &summary).await
        }
        Err(e) => {
            metrics.record_summary(SummaryOutcome::Failed);
            error!(case_id = %case.case_id, error = %e, "Case summary failed");
            producer.reply_error(reply, &e.to_string()).await
        }
    };

    if let Err(e) = sent {
        error!(case_id = %case.case_id, error = %e, "Failed to send summary reply");
    }
}

/// Flatten the blocking analysis result; every failure becomes a reply message
fn analysis_outcome(
    analysis: Result<Result<(Vec<Case>, AnalysisReport), EngineError>, JoinError>,
) -> Result<(Vec<Case>, AnalysisReport), String> {
    match analysis {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => {
            error!(error = %e, "Batch analysis failed");
            Err(e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Batch analysis task panicked");
            Err("batch analysis aborted".to_string())
        }
    }
}

/// Answer a request with `{"error": ...}` when it carries a reply subject
async fn reply_error(producer: &CaseProducer, reply: Option<Subject>, message: &str) {
    let Some(reply) = reply else {
        return;
    };
    if let Err(e) = producer.reply_error(reply, message).await {
        error!(error = %e, "Failed to send error reply");
    }
}
