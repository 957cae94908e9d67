//! Aggregate metrics over a graph's current nodes and edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::KnowledgeGraph;
use crate::canonical::canonical_hash_hex;

/// Snapshot of graph metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// Number of nodes.
    pub node_count: usize,
    /// Number of edges.
    pub edge_count: usize,
    /// Sum of every node's `work_count`.
    pub work_count: u64,
    /// Mean number of edge endpoints per node (0 for an empty graph).
    pub average_node_degree: f64,
    /// Deepest node level (0 for an empty graph).
    pub max_depth: u32,
    /// `edges / (n * (n - 1) / 2)`, defined as 0 below two nodes.
    pub density: f64,
    /// xxh64 of the sorted node ids and `(source, target, type)` triples.
    pub structure_hash: String,
    /// When the snapshot was taken.
    pub last_updated: DateTime<Utc>,
}

impl KnowledgeGraph {
    /// Compute metrics for the graph as it stands.
    pub fn calculate_stats(&self) -> GraphStats {
        let node_count = self.node_count();
        let edge_count = self.edge_count();

        let work_count = self.nodes().map(|node| node.metadata.work_count).sum();
        let max_depth = self.nodes().map(|node| node.level).max().unwrap_or(0);

        // Each edge contributes one degree to each endpoint.
        let average_node_degree = if node_count == 0 {
            0.0
        } else {
            (2 * edge_count) as f64 / node_count as f64
        };

        let density = if node_count < 2 {
            0.0
        } else {
            let max_edges = (node_count * (node_count - 1)) as f64 / 2.0;
            edge_count as f64 / max_edges
        };

        GraphStats {
            node_count,
            edge_count,
            work_count,
            average_node_degree,
            max_depth,
            density,
            structure_hash: self.structure_hash(),
            last_updated: Utc::now(),
        }
    }

    /// Deterministic fingerprint of the graph's shape.
    ///
    /// Ignores labels, metadata and layout; changes whenever a node or an
    /// edge endpoint/type changes.
    pub fn structure_hash(&self) -> String {
        let mut node_ids: Vec<&str> = self.nodes().map(|node| node.id.as_str()).collect();
        node_ids.sort_unstable();

        let mut edge_triples: Vec<(&str, &str, String)> = self
            .edges()
            .map(|edge| (edge.source.as_str(), edge.target.as_str(), edge.edge_type.to_string()))
            .collect();
        edge_triples.sort();

        canonical_hash_hex(&(node_ids, edge_triples))
    }
}
