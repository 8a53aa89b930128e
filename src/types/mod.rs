//! Type definitions for the fraud case engine

pub mod case;
pub mod transaction;

pub use case::{Case, CaseSummary, FraudSignal, RiskLevel, RiskLevelThresholds, SummarySource};
pub use transaction::Transaction;
