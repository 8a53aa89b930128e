//! Stateful anomaly scorer.
//!
//! The scorer trains its isolation forest on the first non-empty batch it
//! sees and scores every later batch against that frozen model. The
//! Unfitted -> Fitted transition happens at most once per scorer, even when
//! several callers race to fit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::EngineError;
use crate::feature_extractor::FeatureMatrix;
use crate::models::isolation_forest::{ForestParams, IsolationForest};

/// Fit state of the scorer; only ever moves from `Unfitted` to `Fitted`
#[derive(Debug, Default)]
enum FitState {
    #[default]
    Unfitted,
    Fitted(Arc<IsolationForest>),
}

/// Isolation-forest scorer with one-way fit semantics
pub struct AnomalyScorer {
    params: ForestParams,
    contamination: f64,
    state: RwLock<FitState>,
    fit_count: AtomicU64,
}

impl AnomalyScorer {
    pub fn new(params: ForestParams, contamination: f64) -> Self {
        Self {
            params,
            contamination: contamination.clamp(0.0, 1.0),
            state: RwLock::new(FitState::Unfitted),
            fit_count: AtomicU64::new(0),
        }
    }

    /// Train on `features` unless a model already exists.
    ///
    /// Returns `true` when this call performed the fit. Empty batches are a no-op.
    pub fn fit_if_needed(&self, features: &FeatureMatrix) -> Result<bool, EngineError> {
        if features.is_empty() || self.is_fitted() {
            return Ok(false);
        }

        let mut state = self.state.write().map_err(|_| EngineError::LockPoisoned)?;
        // Another caller may have fitted while we waited for the write lock
        if matches!(*state, FitState::Fitted(_)) {
            return Ok(false);
        }

        info!(
            rows = features.n_rows(),
            columns = features.n_cols(),
            n_trees = self.params.n_trees,
            "Fitting isolation forest with initial batch"
        );
        let forest = IsolationForest::fit(features, &self.params);
        *state = FitState::Fitted(Arc::new(forest));
        self.fit_count.fetch_add(1, Ordering::SeqCst);

        Ok(true)
    }

    /// Anomaly score per row, higher is more anomalous
    pub fn score(&self, features: &FeatureMatrix) -> Result<Vec<f64>, EngineError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let forest = self.model()?;
        if forest.n_features() != features.n_cols() {
            return Err(EngineError::FeatureDimensionMismatch {
                expected: forest.n_features(),
                actual: features.n_cols(),
            });
        }

        Ok(forest.score(features))
    }

    /// Flag rows at or above the batch's `1 - contamination` quantile.
    ///
    /// When the batch has at most one distinct score the quantile cannot
    /// separate anything, so the first `ceil(n * contamination)` rows (at
    /// least one) in batch order are flagged instead.
    pub fn flag(&self, scores: &[f64]) -> Vec<bool> {
        if scores.is_empty() {
            return Vec::new();
        }

        if distinct_count(scores) <= 1 {
            let n_flagged = ((scores.len() as f64 * self.contamination).ceil() as usize)
                .clamp(1, scores.len());
            debug!(
                rows = scores.len(),
                flagged = n_flagged,
                "Degenerate score distribution, flagging leading rows"
            );
            return (0..scores.len()).map(|i| i < n_flagged).collect();
        }

        let threshold = quantile(scores, self.threshold_quantile());
        debug!(threshold, "Computed anomaly threshold");
        scores.iter().map(|&s| s >= threshold).collect()
    }

    /// Quantile of each batch's score distribution at which rows are flagged
    pub fn threshold_quantile(&self) -> f64 {
        1.0 - self.contamination
    }

    pub fn is_fitted(&self) -> bool {
        self.state
            .read()
            .map(|state| matches!(*state, FitState::Fitted(_)))
            .unwrap_or(false)
    }

    /// Number of fits performed; never exceeds one
    pub fn fit_count(&self) -> u64 {
        self.fit_count.load(Ordering::SeqCst)
    }

    /// The fitted forest; the lock is released before the caller uses it
    fn model(&self) -> Result<Arc<IsolationForest>, EngineError> {
        let state = self.state.read().map_err(|_| EngineError::LockPoisoned)?;
        match &*state {
            FitState::Fitted(forest) => Ok(Arc::clone(forest)),
            FitState::Unfitted => Err(EngineError::ModelNotFitted),
        }
    }
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        Self::new(ForestParams::default(), 0.02)
    }
}

/// Quantile with linear interpolation between order statistics at `q * (n - 1)`
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted.len()
}
