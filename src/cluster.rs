//! Groups anomalous transactions into cases by graph connectivity.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use tracing::debug;

use crate::config::RiskNormalization;
use crate::graph::RelationshipGraph;
use crate::types::case::{Case, FraudSignal};
use crate::types::transaction::Transaction;

/// Name of the signal attached to every graph-derived case
pub const GRAPH_SIGNAL: &str = "graph-connected-anomalies";

const GRAPH_SIGNAL_EXPLANATION: &str =
    "Cluster of anomalous transactions sharing customers, devices, or IPs.";

/// An anomalous transaction with its anomaly score
#[derive(Debug, Clone, Copy)]
pub struct ScoredTransaction<'a> {
    pub transaction: &'a Transaction,
    pub score: f64,
}

/// Builds cases from the connected components of the anomaly subgraph
#[derive(Debug, Clone)]
pub struct ClusterAssembler {
    epsilon: f64,
    normalization: RiskNormalization,
}

impl ClusterAssembler {
    pub fn new(epsilon: f64, normalization: RiskNormalization) -> Self {
        Self {
            epsilon,
            normalization,
        }
    }

    /// Turn anomalies (in batch order) into cases.
    ///
    /// The anomalous transaction nodes and their direct entity neighbors form
    /// the induced subgraph; each connected component holding at least one
    /// transaction becomes one case. Cases are ordered by their first member
    /// in batch order.
    pub fn assemble(
        &self,
        anomalies: &[ScoredTransaction<'_>],
        graph: &RelationshipGraph,
    ) -> Vec<Case> {
        if anomalies.is_empty() {
            return Vec::new();
        }

        let components = self.components(anomalies, graph);
        let max_score = anomalies
            .iter()
            .map(|a| a.score)
            .fold(f64::NEG_INFINITY, f64::max);

        let cases: Vec<Case> = components
            .into_iter()
            .map(|members| self.build_case(&members, max_score))
            .collect();

        debug!(
            anomalies = anomalies.len(),
            cases = cases.len(),
            "Assembled cases from anomaly subgraph"
        );

        cases
    }

    /// Partition anomalies by connected component of the induced subgraph
    fn components<'a>(
        &self,
        anomalies: &[ScoredTransaction<'a>],
        graph: &RelationshipGraph,
    ) -> Vec<Vec<ScoredTransaction<'a>>> {
        let tx_nodes: Vec<Option<NodeIndex>> = anomalies
            .iter()
            .map(|a| graph.transaction_node(&a.transaction.id))
            .collect();

        let mut included: HashSet<NodeIndex> = HashSet::new();
        for node in tx_nodes.iter().flatten() {
            included.insert(*node);
            included.extend(graph.neighbors(*node));
        }

        let mut components = UnionFind::<usize>::new(graph.node_count());
        for (a, b, _) in graph.edges() {
            if included.contains(&a) && included.contains(&b) {
                components.union(a.index(), b.index());
            }
        }

        let mut order: Vec<usize> = Vec::new();
        let mut groups: HashMap<usize, Vec<ScoredTransaction<'a>>> = HashMap::new();
        for (anomaly, node) in anomalies.iter().zip(&tx_nodes) {
            // Transactions missing from the graph form singleton groups
            let root = match node {
                Some(node) => components.find(node.index()),
                None => graph.node_count() + order.len(),
            };
            groups
                .entry(root)
                .or_insert_with(|| {
                    order.push(root);
                    Vec::new()
                })
                .push(*anomaly);
        }

        order
            .into_iter()
            .filter_map(|root| groups.remove(&root))
            .collect()
    }

    fn build_case(&self, members: &[ScoredTransaction<'_>], max_score: f64) -> Case {
        let mean = members.iter().map(|m| m.score).sum::<f64>() / members.len() as f64;
        let risk_score = self.risk_score(mean, max_score);

        let customer_id = mode(members.iter().map(|m| m.transaction.customer_id.as_str()));
        let account_id = mode(members.iter().map(|m| m.transaction.account_id.as_str()));

        let signals = vec![FraudSignal::new(
            GRAPH_SIGNAL,
            risk_score,
            GRAPH_SIGNAL_EXPLANATION,
        )];

        Case::new(
            customer_id,
            account_id,
            members.iter().map(|m| m.transaction.clone()).collect(),
            risk_score,
            signals,
        )
    }

    /// Scale a component's mean anomaly score into [0, 1]
    pub fn risk_score(&self, mean: f64, max_score: f64) -> f64 {
        let raw = match self.normalization {
            RiskNormalization::Batch => mean / (max_score + self.epsilon),
            RiskNormalization::Absolute => mean,
        };
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for ClusterAssembler {
    fn default() -> Self {
        Self::new(1e-6, RiskNormalization::Batch)
    }
}

/// Most frequent value; ties go to the value seen first
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tx(
        id: &str,
        customer: &str,
        account: &str,
        merchant: &str,
        device: &str,
        ip: &str,
    ) -> Transaction {
        Transaction::new(id, customer, account, merchant, 100.0, Utc::now(), "WEB")
            .with_device(device)
            .with_ip(ip)
    }

    fn scored<'a>(txs: &'a [Transaction], scores: &[f64]) -> Vec<ScoredTransaction<'a>> {
        txs.iter()
            .zip(scores)
            .map(|(transaction, &score)| ScoredTransaction { transaction, score })
            .collect()
    }

    fn ids(case: &Case) -> Vec<&str> {
        case.transactions.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_mode_prefers_first_on_tie() {
        assert_eq!(mode(["b", "a", "a", "b"].into_iter()), "b");
        assert_eq!(mode(["x", "y", "y"].into_iter()), "y");
        assert_eq!(mode(std::iter::empty()), "");
    }

    #[test]
    fn test_unrelated_transactions_stay_apart() {
        let txs = vec![
            tx("t1", "C1", "A1", "M1", "D1", "ip1"),
            tx("t2", "C2", "A2", "M2", "D2", "ip2"),
        ];
        let graph = RelationshipGraph::build(&txs);

        let cases = ClusterAssembler::default().assemble(&scored(&txs, &[0.7, 0.8]), &graph);

        assert_eq!(cases.len(), 2);
        assert_eq!(ids(&cases[0]), vec!["t1"]);
        assert_eq!(ids(&cases[1]), vec!["t2"]);
    }

    #[test]
    fn test_shared_device_merges() {
        let txs = vec![
            tx("t1", "C1", "A1", "M1", "D-shared", "ip1"),
            tx("t2", "C2", "A2", "M2", "D-shared", "ip2"),
        ];
        let graph = RelationshipGraph::build(&txs);

        let cases = ClusterAssembler::default().assemble(&scored(&txs, &[0.7, 0.8]), &graph);

        assert_eq!(cases.len(), 1);
        assert_eq!(ids(&cases[0]), vec!["t1", "t2"]);
    }

    #[test]
    fn test_shared_ip_merges() {
        let txs = vec![
            tx("t1", "C1", "A1", "M1", "D1", "10.0.0.5"),
            tx("t2", "C2", "A2", "M2", "D2", "10.0.0.5"),
        ];
        let graph = RelationshipGraph::build(&txs);

        let cases = ClusterAssembler::default().assemble(&scored(&txs, &[0.7, 0.8]), &graph);

        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn test_normal_transactions_do_not_bridge() {
        // t2 links t1 and t3 but is not anomalous, so it is not in the subgraph
        let txs = vec![
            tx("t1", "C1", "A1", "M1", "D1", "ip1"),
            tx("t2", "C2", "A2", "M2", "D1", "ip3"),
            tx("t3", "C3", "A3", "M3", "D3", "ip3"),
        ];
        let graph = RelationshipGraph::build(&txs);
        let anomalies = vec![
            ScoredTransaction { transaction: &txs[0], score: 0.8 },
            ScoredTransaction { transaction: &txs[2], score: 0.8 },
        ];

        let cases = ClusterAssembler::default().assemble(&anomalies, &graph);

        assert_eq!(cases.len(), 2);
    }

    #[test]
    fn test_risk_score_is_batch_relative() {
        let txs = vec![
            tx("t1", "C1", "A1", "M1", "D1", "ip1"),
            tx("t2", "C2", "A2", "M2", "D2", "ip2"),
        ];
        let graph = RelationshipGraph::build(&txs);

        let cases = ClusterAssembler::default().assemble(&scored(&txs, &[0.4, 0.8]), &graph);

        assert!((cases[0].risk_score - 0.5).abs() < 1e-4);
        assert!(cases[1].risk_score <= 1.0);
        assert!((cases[1].risk_score - 1.0).abs() < 1e-4);
        assert_eq!(cases[0].signals.len(), 1);
        assert_eq!(cases[0].signals[0].name, GRAPH_SIGNAL);
        assert_eq!(cases[0].signals[0].score, cases[0].risk_score);
    }

    #[test]
    fn test_absolute_normalization() {
        let assembler = ClusterAssembler::new(1e-6, RiskNormalization::Absolute);
        assert!((assembler.risk_score(0.4, 0.8) - 0.4).abs() < 1e-12);
        assert_eq!(assembler.risk_score(f64::NAN, 0.8), 0.0);
    }

    #[test]
    fn test_primary_identities_use_mode() {
        let txs = vec![
            tx("t1", "C1", "A9", "M1", "D1", "ip1"),
            tx("t2", "C2", "A2", "M1", "D1", "ip1"),
            tx("t3", "C2", "A2", "M1", "D1", "ip1"),
        ];
        let graph = RelationshipGraph::build(&txs);

        let cases = ClusterAssembler::default().assemble(&scored(&txs, &[0.6, 0.6, 0.6]), &graph);

        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].customer_id, "C2");
        assert_eq!(cases[0].primary_account_id, "A2");
    }

    #[test]
    fn test_reclustering_yields_same_partition() {
        let txs = vec![
            tx("t1", "C1", "A1", "M1", "D1", "ip1"),
            tx("t2", "C1", "A2", "M2", "D2", "ip2"),
            tx("t3", "C3", "A3", "M3", "D3", "ip3"),
            tx("t4", "C4", "A4", "M4", "D3", "ip4"),
        ];
        let graph = RelationshipGraph::build(&txs);
        let anomalies = scored(&txs, &[0.6, 0.7, 0.8, 0.9]);
        let assembler = ClusterAssembler::default();

        let first = assembler.assemble(&anomalies, &graph);
        let second = assembler.assemble(&anomalies, &graph);

        let partition = |cases: &[Case]| -> Vec<Vec<String>> {
            cases
                .iter()
                .map(|c| c.transactions.iter().map(|t| t.id.clone()).collect())
                .collect()
        };
        assert_eq!(partition(&first), partition(&second));
        assert_eq!(partition(&first), vec![vec!["t1", "t2"], vec!["t3", "t4"]]);
        assert_ne!(first[0].case_id, second[0].case_id);
    }

    #[test]
    fn test_empty_anomalies() {
        let graph = RelationshipGraph::build(&[]);
        assert!(ClusterAssembler::default().assemble(&[], &graph).is_empty());
    }
}
