//! Fraud case data structures

use serde::{Deserialize, Serialize};

use super::transaction::Transaction;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds
    pub fn from_score(score: f64, thresholds: &RiskLevelThresholds) -> Self {
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Lower bounds for each risk level above `Low`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.6,
            critical: 0.8,
        }
    }
}

/// A named piece of evidence attached to a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    /// Signal identifier, e.g. `graph-connected-anomalies`
    pub name: String,
    /// Strength of the signal (0.0 - 1.0)
    pub score: f64,
    /// Human-readable reason the signal fired
    pub explanation: String,
}

impl FraudSignal {
    pub fn new(name: impl Into<String>, score: f64, explanation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score,
            explanation: explanation.into(),
        }
    }
}

/// A cluster of related anomalous transactions, investigated as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Unique case identifier (UUID v4)
    pub case_id: String,

    /// Most frequent customer among member transactions
    pub customer_id: String,

    /// Most frequent account among member transactions
    pub primary_account_id: String,

    /// Member transactions, in batch order
    pub transactions: Vec<Transaction>,

    /// Aggregate risk score (0.0 - 1.0)
    pub risk_score: f64,

    /// Evidence supporting the case
    pub signals: Vec<FraudSignal>,
}

impl Case {
    /// Create a case with a freshly generated identifier
    pub fn new(
        customer_id: String,
        primary_account_id: String,
        transactions: Vec<Transaction>,
        risk_score: f64,
        signals: Vec<FraudSignal>,
    ) -> Self {
        Self {
            case_id: uuid::Uuid::new_v4().to_string(),
            customer_id,
            primary_account_id,
            transactions,
            risk_score,
            signals,
        }
    }

    /// Sum of member transaction amounts
    pub fn total_amount(&self) -> f64 {
        self.transactions.iter().map(|t| t.amount).sum()
    }

    /// Classify the case risk score
    pub fn risk_level(&self, thresholds: &RiskLevelThresholds) -> RiskLevel {
        RiskLevel::from_score(self.risk_score, thresholds)
    }
}

/// Which path produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Text came from the generative backend
    Generated,
    /// Deterministic rule-based text
    Fallback,
}

/// Investigator-facing narrative for a case. Created per request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case: Case,
    pub narrative: String,
    pub recommendation: String,
    pub source: SummarySource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tx(id: &str, amount: f64) -> Transaction {
        Transaction::new(id, "C1", "A1", "M1", amount, Utc::now(), "WEB")
    }

    #[test]
    fn test_risk_level_from_score() {
        let thresholds = RiskLevelThresholds::default();

        assert_eq!(RiskLevel::from_score(0.1, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.4, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.75, &thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.95, &thresholds), RiskLevel::Critical);
    }

    #[test]
    fn test_case_ids_are_unique() {
        let a = Case::new("C1".into(), "A1".into(), vec![tx("t1", 1.0)], 0.5, vec![]);
        let b = Case::new("C1".into(), "A1".into(), vec![tx("t1", 1.0)], 0.5, vec![]);

        assert_ne!(a.case_id, b.case_id);
    }

    #[test]
    fn test_total_amount() {
        let case = Case::new(
            "C1".into(),
            "A1".into(),
            vec![tx("t1", 500.0), tx("t2", 250.5)],
            0.9,
            vec![FraudSignal::new("graph-connected-anomalies", 0.9, "test")],
        );

        assert!((case.total_amount() - 750.5).abs() < 1e-9);
        assert_eq!(case.risk_level(&RiskLevelThresholds::default()), RiskLevel::Critical);
    }

    #[test]
    fn test_case_summary_serialization() {
        let case = Case::new("C1".into(), "A1".into(), vec![tx("t1", 1.0)], 0.5, vec![]);
        let summary = CaseSummary {
            case,
            narrative: "n".to_string(),
            recommendation: "r".to_string(),
            source: SummarySource::Fallback,
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["case"]["customer_id"], "C1");
    }
}
