//! Case narrative generation
//!
//! With a backend configured, the case is rendered into a prompt, sent once,
//! and the reply is split into narrative and recommendation. Without one, a
//! deterministic rule-based narrative is produced. A configured backend that
//! fails reports a [`SummaryError`]; it does not silently fall back.

pub mod backend;
pub mod parser;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SummarizerConfig;
use crate::error::SummaryError;
use crate::types::case::{Case, CaseSummary, SummarySource};

pub use backend::{BackendResponse, OpenAiBackend, TextBackend};
pub use parser::{parse_sections, ParsedSummary, DEFAULT_RECOMMENDATION};
pub use prompt::build_prompt;

/// Recommendation attached to rule-based summaries
pub const FALLBACK_RECOMMENDATION: &str = "Recommend temporarily restricting the account, \
     contacting the customer, and escalating to Level 2 analyst for review.";

/// Produces investigator-facing summaries for cases
#[derive(Debug, Clone)]
pub struct CaseSummarizer {
    backend: Option<Arc<dyn TextBackend>>,
    timeout: Duration,
}

impl CaseSummarizer {
    /// Rule-based summarizer with no backend
    pub fn without_backend() -> Self {
        Self {
            backend: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Summarizer using a given backend, each call bounded by `timeout`
    pub fn with_backend(backend: Arc<dyn TextBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
        }
    }

    /// OpenAI-backed when an API key is configured, rule-based otherwise
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, SummaryError> {
        if config.api_key.is_none() {
            info!("No summary backend configured, using rule-based narratives");
            return Ok(Self::without_backend());
        }

        let backend = OpenAiBackend::new(config)?;
        info!(model = %config.model, "Summary backend configured");
        Ok(Self::with_backend(
            Arc::new(backend),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Summarize a case
    pub async fn summarize(&self, case: &Case) -> Result<CaseSummary, SummaryError> {
        let Some(backend) = &self.backend else {
            return Ok(Self::fallback(case));
        };

        let prompt = build_prompt(case);
        debug!(case_id = %case.case_id, backend = backend.name(), "Requesting case narrative");

        let response = tokio::time::timeout(self.timeout, backend.generate(&prompt))
            .await
            .map_err(|_| SummaryError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| {
                warn!(case_id = %case.case_id, error = %e, "Summary backend failed");
                e
            })?;

        let parsed = parse_sections(&response.into_text());

        Ok(CaseSummary {
            case: case.clone(),
            narrative: parsed.narrative,
            recommendation: parsed.recommendation,
            source: SummarySource::Generated,
        })
    }

    /// Deterministic rule-based summary
    pub fn fallback(case: &Case) -> CaseSummary {
        let narrative = format!(
            "{} suspicious transactions detected for customer {} on account {}, total value {:.2}.",
            case.transactions.len(),
            case.customer_id,
            case.primary_account_id,
            case.total_amount()
        );

        CaseSummary {
            case: case.clone(),
            narrative,
            recommendation: FALLBACK_RECOMMENDATION.to_string(),
            source: SummarySource::Fallback,
        }
    }
}

impl Default for CaseSummarizer {
    fn default() -> Self {
        Self::without_backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::case::FraudSignal;
    use crate::types::transaction::Transaction;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StubBackend {
        reply: Result<serde_json::Value, u16>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn replying(value: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(value),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, _prompt: &str) -> Result<BackendResponse, SummaryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(value) => Ok(BackendResponse::from_json(value.clone())),
                Err(status) => Err(SummaryError::Status {
                    status: *status,
                    body: "upstream error".to_string(),
                }),
            }
        }
    }

    #[derive(Debug)]
    struct SlowBackend;

    #[async_trait]
    impl TextBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> Result<BackendResponse, SummaryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(BackendResponse::OutputText("late".to_string()))
        }
    }

    fn three_transaction_case() -> Case {
        let now = Utc::now();
        Case::new(
            "C1".into(),
            "A1".into(),
            vec![
                Transaction::new("t1", "C1", "A1", "M1", 500.0, now, "WEB"),
                Transaction::new("t2", "C1", "A1", "M1", 700.0, now, "WEB"),
                Transaction::new("t3", "C1", "A1", "M2", 300.0, now, "POS"),
            ],
            0.9,
            vec![FraudSignal::new("graph-connected-anomalies", 0.9, "test")],
        )
    }

    #[tokio::test]
    async fn test_fallback_without_backend() {
        let summarizer = CaseSummarizer::without_backend();
        let summary = summarizer.summarize(&three_transaction_case()).await.unwrap();

        assert!(summary.narrative.contains("3 suspicious transactions"));
        assert!(summary.narrative.contains("C1"));
        assert!(summary.narrative.contains("A1"));
        assert!(summary.narrative.contains("1500.00"));
        assert!(!summary.recommendation.is_empty());
        assert_eq!(summary.source, SummarySource::Fallback);
    }

    #[tokio::test]
    async fn test_generated_summary_is_parsed() {
        let backend = StubBackend::replying(serde_json::json!({
            "output_text": "Narrative:\nThree rapid purchases.\nRecommendation:\nBlock the account."
        }));
        let summarizer = CaseSummarizer::with_backend(backend.clone(), Duration::from_secs(5));

        let summary = summarizer.summarize(&three_transaction_case()).await.unwrap();

        assert_eq!(summary.narrative, "Three rapid purchases.");
        assert_eq!(summary.recommendation, "Block the account.");
        assert_eq!(summary.source, SummarySource::Generated);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unlabelled_reply_uses_defaults() {
        let backend = StubBackend::replying(serde_json::json!({
            "output": [{"content": [{"text": "Something odd happened."}]}]
        }));
        let summarizer = CaseSummarizer::with_backend(backend, Duration::from_secs(5));

        let summary = summarizer.summarize(&three_transaction_case()).await.unwrap();

        assert_eq!(summary.narrative, "Something odd happened.");
        assert_eq!(summary.recommendation, DEFAULT_RECOMMENDATION);
    }

    #[tokio::test]
    async fn test_backend_error_is_surfaced() {
        let summarizer =
            CaseSummarizer::with_backend(StubBackend::failing(503), Duration::from_secs(5));

        let result = summarizer.summarize(&three_transaction_case()).await;

        assert!(matches!(result, Err(SummaryError::Status { status: 503, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_timeout() {
        let summarizer =
            CaseSummarizer::with_backend(Arc::new(SlowBackend), Duration::from_secs(2));

        let result = summarizer.summarize(&three_transaction_case()).await;

        assert!(matches!(result, Err(SummaryError::Timeout(2))));
    }

    #[test]
    fn test_from_config_without_key() {
        let summarizer = CaseSummarizer::from_config(&SummarizerConfig::default()).unwrap();
        assert!(!summarizer.has_backend());
    }
}
