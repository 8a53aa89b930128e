//! Error types for the detection engine

use thiserror::Error;

/// Errors raised while analyzing a transaction batch
#[derive(Debug, Error)]
pub enum EngineError {
    /// Scoring was requested before any batch was fitted
    #[error("Anomaly model has not been fitted")]
    ModelNotFitted,

    /// Feature matrix does not match the fitted model
    #[error("Feature dimension mismatch: model expects {expected} columns, got {actual}")]
    FeatureDimensionMismatch { expected: usize, actual: usize },

    /// Transaction failed the engine's sanity check
    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },

    /// A thread panicked while holding the fit-state lock
    #[error("Fit-state lock poisoned")]
    LockPoisoned,
}

/// Errors raised by the generative summarization backend.
///
/// Kept distinct from the no-backend path: a configured backend that fails
/// is reported here instead of degrading to the rule-based narrative.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Backend did not answer in time
    #[error("Summary backend timed out after {0}s")]
    Timeout(u64),

    /// Backend was unreachable
    #[error("Summary backend transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("Summary backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Backend answered with a body that could not be decoded
    #[error("Invalid summary backend response: {0}")]
    InvalidResponse(String),

    /// Backend could not be constructed from configuration
    #[error("Summary backend misconfigured: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for SummaryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SummaryError::InvalidResponse(err.to_string())
        } else {
            SummaryError::Transport(err.to_string())
        }
    }
}
