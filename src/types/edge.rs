//! Edge types for the knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of edge in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Hierarchical parent -> child containment.
    Contains,
    /// Source must be learned before target.
    Prerequisite,
    /// Loose association.
    Related,
    /// Target builds on source.
    Extends,
    /// Cross reference.
    Reference,
}

impl EdgeType {
    /// Parse edge type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contains" => Some(Self::Contains),
            "prerequisite" => Some(Self::Prerequisite),
            "related" => Some(Self::Related),
            "extends" => Some(Self::Extends),
            "reference" | "" => Some(Self::Reference),
            _ => None,
        }
    }

    /// Whether this edge type forms the hierarchy.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::Contains)
    }
}

impl Default for EdgeType {
    fn default() -> Self {
        Self::Reference
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contains => write!(f, "CONTAINS"),
            Self::Prerequisite => write!(f, "PREREQUISITE"),
            Self::Related => write!(f, "RELATED"),
            Self::Extends => write!(f, "EXTENDS"),
            Self::Reference => write!(f, "REFERENCE"),
        }
    }
}

/// Line style used when rendering an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    /// Solid line.
    #[default]
    Solid,
    /// Dashed line.
    Dashed,
    /// Dotted line.
    Dotted,
}

/// Edge metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMetadata {
    /// Relationship strength [0, 1].
    pub strength: f64,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Display color.
    #[serde(default)]
    pub color: Option<String>,
    /// Line style.
    #[serde(default)]
    pub style: EdgeStyle,
    /// Whether the edge is animated.
    #[serde(default)]
    pub animated: bool,
    /// Whether the relationship reads both ways.
    #[serde(default)]
    pub bidirectional: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Default for EdgeMetadata {
    fn default() -> Self {
        Self {
            strength: 1.0,
            description: String::new(),
            color: None,
            style: EdgeStyle::default(),
            animated: false,
            bidirectional: false,
            created_at: Utc::now(),
        }
    }
}

/// Edge in the knowledge graph.
///
/// `source` and `target` are node ids within the same graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Identifier, unique within its graph.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Type of edge.
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Weight [0, 1].
    pub weight: f64,
    /// Edge metadata.
    #[serde(default)]
    pub metadata: EdgeMetadata,
    /// Whether the edge is rendered.
    pub is_visible: bool,
    /// Directed edges take part in cycle detection.
    pub is_directed: bool,
}

impl GraphEdge {
    /// Create a new visible, directed edge with weight 1.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            edge_type,
            weight: 1.0,
            metadata: EdgeMetadata::default(),
            is_visible: true,
            is_directed: true,
        }
    }

    /// Create a hierarchical `CONTAINS` edge (parent -> child).
    pub fn contains(id: impl Into<String>, parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self::new(id, parent, child, EdgeType::Contains)
    }

    /// Mark the edge as undirected.
    pub fn undirected(mut self) -> Self {
        self.is_directed = false;
        self
    }

    /// Set the weight, clamped to [0, 1].
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Whether this edge touches the given node.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}
