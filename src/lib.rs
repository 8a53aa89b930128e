//! Fraud Case Engine Library
//!
//! Turns batches of payment transactions into investigable fraud cases:
//! isolation-forest anomaly scoring, entity-graph clustering of the
//! anomalies, and on-demand investigator narratives.

pub mod cluster;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod feature_extractor;
pub mod graph;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod summarizer;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use engine::{AnalysisReport, DetectionEngine};
pub use error::{EngineError, SummaryError};
pub use producer::CaseProducer;
pub use types::{
    case::{Case, CaseSummary},
    transaction::Transaction,
};
