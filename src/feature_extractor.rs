//! Feature extraction for anomaly scoring.
//!
//! Turns a transaction batch into a numeric matrix, one row per transaction
//! in batch order. Columns:
//!
//! | column          | meaning                                                      |
//! |-----------------|--------------------------------------------------------------|
//! | `amount`        | transaction amount, unscaled                                 |
//! | `hour`          | UTC hour of day (0-23)                                       |
//! | `hourly_count`  | transactions of the same customer in the same UTC hour bucket |
//! | `ch_<CHANNEL>`  | 0/1 indicator for each recognized channel                    |
//! | `ch_other`      | 0/1 indicator for any unrecognized channel                   |
//!
//! The channel columns come from a fixed configured vocabulary, so the
//! column set is the same for every batch. Earlier revisions derived one
//! column per distinct channel observed in the batch, which made the feature
//! space drift between calls; integrators relying on that encoding should
//! note that unseen channels now share the `ch_other` column.

use crate::types::transaction::Transaction;
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;

/// Bumped whenever the column layout changes
pub const FEATURE_SCHEMA_VERSION: u32 = 2;

const BASE_FEATURES: [&str; 3] = ["amount", "hour", "hourly_count"];

/// Row-major feature matrix, aligned row-per-transaction with its batch
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    n_cols: usize,
}

impl FeatureMatrix {
    pub fn new(rows: Vec<Vec<f64>>, n_cols: usize) -> Self {
        Self { rows, n_cols }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Feature extractor that transforms a transaction batch into model input.
pub struct FeatureExtractor {
    /// Recognized channels, normalized to upper case
    channels: Vec<String>,
}

impl FeatureExtractor {
    /// Create an extractor recognizing the given channels
    pub fn new<S: AsRef<str>>(channels: &[S]) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(channels.len());
        for channel in channels {
            let channel = normalize_channel(channel.as_ref());
            if !channel.is_empty() && !normalized.contains(&channel) {
                normalized.push(channel);
            }
        }
        Self {
            channels: normalized,
        }
    }

    /// Build the feature matrix for a batch
    pub fn build(&self, transactions: &[Transaction]) -> FeatureMatrix {
        let n_cols = self.feature_count();
        let hourly_counts = hourly_counts(transactions);

        let rows = transactions
            .iter()
            .map(|tx| {
                let mut features = Vec::with_capacity(n_cols);

                features.push(if tx.amount.is_finite() { tx.amount } else { 0.0 });
                features.push(tx.timestamp.hour() as f64);

                let bucket = (tx.customer_id.as_str(), hour_bucket(&tx.timestamp));
                let count = hourly_counts.get(&bucket).copied().unwrap_or(0);
                features.push(count as f64);

                features.extend(self.channel_indicators(&tx.channel));
                features
            })
            .collect();

        FeatureMatrix::new(rows, n_cols)
    }

    /// One-hot channel encoding: recognized channels, then `other`
    fn channel_indicators(&self, channel: &str) -> Vec<f64> {
        let channel = normalize_channel(channel);
        let mut indicators = vec![0.0; self.channels.len() + 1];
        match self.channels.iter().position(|c| *c == channel) {
            Some(idx) => indicators[idx] = 1.0,
            None => indicators[self.channels.len()] = 1.0,
        }
        indicators
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        BASE_FEATURES.len() + self.channels.len() + 1
    }

    /// Column names, in matrix order
    pub fn feature_names(&self) -> Vec<String> {
        BASE_FEATURES
            .iter()
            .map(|name| name.to_string())
            .chain(self.channels.iter().map(|c| format!("ch_{}", c)))
            .chain(std::iter::once("ch_other".to_string()))
            .collect()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&["POS", "WEB", "MOBILE", "ATM"])
    }
}

fn normalize_channel(channel: &str) -> String {
    channel.trim().to_uppercase()
}

/// Seconds since the epoch, floored to the hour
fn hour_bucket(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(3600)
}

fn hourly_counts(transactions: &[Transaction]) -> HashMap<(&str, i64), usize> {
    let mut counts = HashMap::new();
    for tx in transactions {
        *counts
            .entry((tx.customer_id.as_str(), hour_bucket(&tx.timestamp)))
            .or_insert(0) += 1;
    }
    counts
}
