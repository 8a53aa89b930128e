//! Anomaly model components

pub mod isolation_forest;
pub mod scorer;

pub use isolation_forest::{ForestParams, IsolationForest};
pub use scorer::AnomalyScorer;
