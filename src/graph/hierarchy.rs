//! Read-only traversal over `CONTAINS` edges.

use std::collections::HashSet;

use super::KnowledgeGraph;
use crate::types::GraphNode;

impl KnowledgeGraph {
    /// Targets of the `CONTAINS` edges leaving `node_id`, ordered by id.
    ///
    /// Returns `None` if the node does not exist.
    pub fn get_child_nodes(&self, node_id: &str) -> Option<Vec<&GraphNode>> {
        self.get_node(node_id)?;
        let mut children: Vec<&GraphNode> = self
            .outgoing_edges(node_id)
            .filter(|edge| edge.edge_type.is_hierarchical())
            .filter_map(|edge| self.get_node(&edge.target))
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        Some(children)
    }

    /// Source of the `CONTAINS` edge entering `node_id`.
    ///
    /// A node has at most one such edge; `add_edge` rejects a second one.
    pub fn get_parent_node(&self, node_id: &str) -> Option<&GraphNode> {
        self.parent_id_of(node_id).and_then(|id| self.get_node(id))
    }

    /// Nodes from the root down to `node_id`, inclusive.
    ///
    /// Empty if the node does not exist.
    pub fn get_node_path(&self, node_id: &str) -> Vec<&GraphNode> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get_node(node_id);

        while let Some(node) = current {
            if !seen.insert(node.id.as_str()) {
                break;
            }
            path.push(node);
            current = self.get_parent_node(&node.id);
        }

        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::KnowledgeGraph;
    use crate::types::{EdgeType, GraphEdge, GraphNode, NodeType};

    fn tree() -> KnowledgeGraph {
        //        math
        //       /    \
        //  algebra  geometry
        //     |
        //  linear
        let mut graph = KnowledgeGraph::new("g1", "owner", "Math");
        graph.add_node(GraphNode::new("math", "Math", NodeType::Topic, 0)).unwrap();
        graph.add_node(GraphNode::new("algebra", "Algebra", NodeType::Subtopic, 1)).unwrap();
        graph.add_node(GraphNode::new("geometry", "Geometry", NodeType::Subtopic, 1)).unwrap();
        graph.add_node(GraphNode::new("linear", "Linear eqs", NodeType::Concept, 2)).unwrap();
        graph.add_edge(GraphEdge::contains("e1", "math", "geometry")).unwrap();
        graph.add_edge(GraphEdge::contains("e2", "math", "algebra")).unwrap();
        graph.add_edge(GraphEdge::contains("e3", "algebra", "linear")).unwrap();
        graph
            .add_edge(GraphEdge::new("x1", "geometry", "linear", EdgeType::Related))
            .unwrap();
        graph
    }

    #[test]
    fn test_children_only_follow_contains() {
        let graph = tree();
        let ids: Vec<_> = graph
            .get_child_nodes("math")
            .unwrap()
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["algebra", "geometry"]);

        assert!(graph.get_child_nodes("geometry").unwrap().is_empty());
        assert!(graph.get_child_nodes("missing").is_none());
    }

    #[test]
    fn test_parent() {
        let graph = tree();
        assert_eq!(graph.get_parent_node("linear").unwrap().id, "algebra");
        assert!(graph.get_parent_node("math").is_none());
    }

    #[test]
    fn test_path_root_to_node() {
        let graph = tree();
        let path: Vec<_> = graph.get_node_path("linear").into_iter().map(|n| n.id.as_str()).collect();
        assert_eq!(path, vec!["math", "algebra", "linear"]);
        assert!(graph.get_node_path("missing").is_empty());
    }
}
