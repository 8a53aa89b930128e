//! Entity relationship graph.
//!
//! Every transaction becomes a node linked to the customer, account,
//! merchant, device and IP it touched. Entities are only ever connected
//! through a shared transaction.

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;

use crate::types::transaction::Transaction;

/// Kind of graph vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Transaction,
    Customer,
    Account,
    Merchant,
    Device,
    Ip,
}

impl NodeKind {
    /// Namespace prefix used in node keys
    pub fn prefix(&self) -> &'static str {
        match self {
            NodeKind::Transaction => "tx",
            NodeKind::Customer => "cust",
            NodeKind::Account => "acct",
            NodeKind::Merchant => "merch",
            NodeKind::Device => "dev",
            NodeKind::Ip => "ip",
        }
    }

    /// Relation tag carried by an edge from a transaction to this kind of entity
    fn relation(&self) -> Option<Relation> {
        match self {
            NodeKind::Transaction => None,
            NodeKind::Customer => Some(Relation::Customer),
            NodeKind::Account => Some(Relation::Account),
            NodeKind::Merchant => Some(Relation::Merchant),
            NodeKind::Device => Some(Relation::Device),
            NodeKind::Ip => Some(Relation::Ip),
        }
    }
}

/// Edge type between a transaction and an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Customer,
    Account,
    Merchant,
    Device,
    Ip,
}

/// Graph vertex: a namespaced identity such as `tx:123` or `dev:DEV-01`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityNode {
    pub kind: NodeKind,
    pub value: String,
}

impl EntityNode {
    pub fn new(kind: NodeKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn is_transaction(&self) -> bool {
        self.kind == NodeKind::Transaction
    }
}

impl fmt::Display for EntityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.value)
    }
}

/// Undirected transaction/entity graph for one batch
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    graph: UnGraph<EntityNode, Relation>,
    index: HashMap<EntityNode, NodeIndex>,
}

impl RelationshipGraph {
    /// Build the graph for a batch
    pub fn build(transactions: &[Transaction]) -> Self {
        let mut graph = Self::default();
        for tx in transactions {
            graph.add_transaction(tx);
        }
        graph
    }

    fn add_transaction(&mut self, tx: &Transaction) {
        let tx_node = self.get_or_add_node(EntityNode::new(NodeKind::Transaction, tx.id.as_str()));

        let entities = [
            (NodeKind::Customer, tx.customer_id.as_str()),
            (NodeKind::Account, tx.account_id.as_str()),
            (NodeKind::Merchant, tx.merchant_id.as_str()),
            (NodeKind::Device, tx.device_key()),
            (NodeKind::Ip, tx.ip_key()),
        ];

        for (kind, value) in entities {
            let entity = self.get_or_add_node(EntityNode::new(kind, value));
            if let Some(relation) = kind.relation() {
                // update_edge keeps a single edge per node pair
                self.graph.update_edge(tx_node, entity, relation);
            }
        }
    }

    fn get_or_add_node(&mut self, node: EntityNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.index.insert(node, idx);
        idx
    }

    /// Index of the node for a transaction id
    pub fn transaction_node(&self, tx_id: &str) -> Option<NodeIndex> {
        self.node_index(&EntityNode::new(NodeKind::Transaction, tx_id))
    }

    pub fn node_index(&self, node: &EntityNode) -> Option<NodeIndex> {
        self.index.get(node).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &EntityNode {
        &self.graph[idx]
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    /// Edges as `(a, b, relation)` triples
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, Relation)> + '_ {
        use petgraph::visit::EdgeRef;
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), *e.weight()))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
