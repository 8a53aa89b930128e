//! Detection engine: the two operations the service exposes.
//!
//! `analyze` runs features -> scores -> anomaly subset -> graph -> cases for
//! one batch. `summarize` turns a case into a narrative. The engine is meant
//! to be shared (`Arc<DetectionEngine>`) across concurrent requests; the
//! scorer's fit state is its only mutable state.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cluster::{ClusterAssembler, ScoredTransaction};
use crate::config::{AppConfig, DetectionConfig};
use crate::error::{EngineError, SummaryError};
use crate::feature_extractor::FeatureExtractor;
use crate::graph::RelationshipGraph;
use crate::models::isolation_forest::ForestParams;
use crate::models::scorer::AnomalyScorer;
use crate::summarizer::CaseSummarizer;
use crate::types::case::{Case, CaseSummary};
use crate::types::transaction::Transaction;

/// Per-batch statistics from [`DetectionEngine::analyze_with_report`]
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub transactions: usize,
    pub anomalies: usize,
    pub cases: usize,
    /// Whether this batch trained the model
    pub fitted: bool,
}

/// Orchestrates feature building, scoring, graph clustering and summarization
pub struct DetectionEngine {
    features: FeatureExtractor,
    scorer: AnomalyScorer,
    assembler: ClusterAssembler,
    summarizer: CaseSummarizer,
}

impl DetectionEngine {
    /// Build an engine from detection settings and a summarizer
    pub fn new(detection: &DetectionConfig, summarizer: CaseSummarizer) -> Self {
        let params = ForestParams {
            n_trees: detection.n_trees,
            max_samples: detection.max_samples,
            seed: detection.seed,
        };

        Self {
            features: FeatureExtractor::new(detection.channels.as_slice()),
            scorer: AnomalyScorer::new(params, detection.contamination),
            assembler: ClusterAssembler::new(detection.risk_epsilon, detection.normalization),
            summarizer,
        }
    }

    /// Build an engine, including its summary backend, from application config
    pub fn from_config(config: &AppConfig) -> Result<Self, SummaryError> {
        let summarizer = CaseSummarizer::from_config(&config.summarizer)?;
        Ok(Self::new(&config.detection, summarizer))
    }

    /// Detect cases in a batch. Empty input or no anomalies yields no cases.
    pub fn analyze(&self, transactions: &[Transaction]) -> Result<Vec<Case>, EngineError> {
        self.analyze_with_report(transactions).map(|(cases, _)| cases)
    }

    /// Detect cases and report batch statistics
    pub fn analyze_with_report(
        &self,
        transactions: &[Transaction],
    ) -> Result<(Vec<Case>, AnalysisReport), EngineError> {
        if transactions.is_empty() {
            return Ok((Vec::new(), AnalysisReport::default()));
        }
        validate(transactions)?;

        let start = Instant::now();
        let features = self.features.build(transactions);
        let fitted = self.scorer.fit_if_needed(&features)?;
        let scores = self.scorer.score(&features)?;
        let flags = self.scorer.flag(&scores);

        let anomalies: Vec<ScoredTransaction<'_>> = transactions
            .iter()
            .zip(&scores)
            .zip(&flags)
            .filter_map(|((transaction, &score), &flagged)| {
                flagged.then_some(ScoredTransaction { transaction, score })
            })
            .collect();

        let mut report = AnalysisReport {
            transactions: transactions.len(),
            anomalies: anomalies.len(),
            cases: 0,
            fitted,
        };

        if anomalies.is_empty() {
            debug!(transactions = transactions.len(), "No anomalies in batch");
            return Ok((Vec::new(), report));
        }

        let graph = RelationshipGraph::build(transactions);
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built relationship graph"
        );

        let cases = self.assembler.assemble(&anomalies, &graph);
        report.cases = cases.len();

        info!(
            transactions = report.transactions,
            anomalies = report.anomalies,
            cases = report.cases,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Batch analyzed"
        );

        Ok((cases, report))
    }

    /// Summarize a case. Backend failures are returned, not masked.
    pub async fn summarize(&self, case: &Case) -> Result<CaseSummary, SummaryError> {
        self.summarizer.summarize(case).await
    }

    /// Summarize a case, using the rule-based narrative if the backend fails.
    ///
    /// Callers opt into this explicitly; the returned summary is marked as
    /// a fallback.
    pub async fn summarize_or_fallback(&self, case: &Case) -> CaseSummary {
        match self.summarizer.summarize(case).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(case_id = %case.case_id, error = %e, "Falling back to rule-based summary");
                CaseSummarizer::fallback(case)
            }
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.scorer.is_fitted()
    }

    pub fn fit_count(&self) -> u64 {
        self.scorer.fit_count()
    }

    pub fn has_summary_backend(&self) -> bool {
        self.summarizer.has_backend()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.feature_names()
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(&DetectionConfig::default(), CaseSummarizer::without_backend())
    }
}

fn validate(transactions: &[Transaction]) -> Result<(), EngineError> {
    for tx in transactions {
        if !tx.amount.is_finite() || tx.amount < 0.0 {
            return Err(EngineError::InvalidTransaction {
                id: tx.id.clone(),
                reason: format!("amount must be a non-negative number, got {}", tx.amount),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::{BackendResponse, TextBackend};
    use crate::types::case::SummarySource;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct UnavailableBackend;

    #[async_trait]
    impl TextBackend for UnavailableBackend {
        fn name(&self) -> &str {
            "unavailable"
        }

        async fn generate(&self, _prompt: &str) -> Result<BackendResponse, SummaryError> {
            Err(SummaryError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            })
        }
    }

    fn engine_with_failing_backend() -> DetectionEngine {
        let summarizer =
            CaseSummarizer::with_backend(Arc::new(UnavailableBackend), Duration::from_secs(5));
        DetectionEngine::new(&DetectionConfig::default(), summarizer)
    }

    #[test]
    fn test_empty_batch() {
        let engine = DetectionEngine::default();
        assert!(engine.analyze(&[]).unwrap().is_empty());
        assert!(!engine.is_fitted());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let engine = DetectionEngine::default();
        let tx = Transaction::new("t1", "C1", "A1", "M1", -5.0, Utc::now(), "POS");

        assert!(matches!(
            engine.analyze(&[tx]),
            Err(EngineError::InvalidTransaction { .. })
        ));
        assert!(!engine.is_fitted());
    }

    #[test]
    fn test_single_transaction_batch() {
        let engine = DetectionEngine::default();
        let tx = Transaction::new("t1", "C1", "A1", "M1", 25.0, Utc::now(), "POS");

        let (cases, report) = engine.analyze_with_report(&[tx]).unwrap();

        assert!(report.fitted);
        assert_eq!(report.anomalies, 1);
        assert_eq!(cases.len(), 1);
        assert!(cases[0].risk_score <= 1.0 && cases[0].risk_score >= 0.0);
    }

    #[tokio::test]
    async fn test_summarize_or_fallback_without_backend() {
        let engine = DetectionEngine::default();
        let tx = Transaction::new("t1", "C1", "A1", "M1", 25.0, Utc::now(), "POS");
        let cases = engine.analyze(&[tx]).unwrap();

        let summary = engine.summarize_or_fallback(&cases[0]).await;
        assert!(summary.narrative.starts_with("1 suspicious transactions"));
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_from_summarize() {
        let engine = engine_with_failing_backend();
        let tx = Transaction::new("t1", "C1", "A1", "M1", 25.0, Utc::now(), "POS");
        let cases = engine.analyze(&[tx]).unwrap();

        assert!(engine.has_summary_backend());
        assert!(matches!(
            engine.summarize(&cases[0]).await,
            Err(SummaryError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_summarize_or_fallback_after_backend_failure() {
        let engine = engine_with_failing_backend();
        let tx = Transaction::new("t1", "C1", "A1", "M1", 25.0, Utc::now(), "POS");
        let cases = engine.analyze(&[tx]).unwrap();

        let summary = engine.summarize_or_fallback(&cases[0]).await;

        assert_eq!(summary.source, SummarySource::Fallback);
        assert_eq!(summary.case.case_id, cases[0].case_id);
        assert!(summary.narrative.contains("customer C1 on account A1"));
        assert!(!summary.recommendation.is_empty());
    }
}
