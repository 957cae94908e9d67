//! Node types for the knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of topic a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Top-level subject area.
    Topic,
    /// Subdivision of a topic.
    Subtopic,
    /// Single teachable concept.
    Concept,
    /// Practical skill.
    Skill,
    /// External resource or reference material.
    Resource,
}

impl NodeType {
    /// Parse node type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "topic" => Some(Self::Topic),
            "subtopic" => Some(Self::Subtopic),
            "concept" => Some(Self::Concept),
            "skill" => Some(Self::Skill),
            "resource" => Some(Self::Resource),
            _ => None,
        }
    }
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Concept
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic => write!(f, "TOPIC"),
            Self::Subtopic => write!(f, "SUBTOPIC"),
            Self::Concept => write!(f, "CONCEPT"),
            Self::Skill => write!(f, "SKILL"),
            Self::Resource => write!(f, "RESOURCE"),
        }
    }
}

/// Position of a node in layout space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Descriptive and derived data carried by a node.
///
/// `work_count` and `reuse_count` are an advisory projection of the mounts
/// bound to the node. They are written back by the mount registry and should
/// not be treated as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMetadata {
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Number of content records mounted on this node.
    #[serde(default)]
    pub work_count: u64,
    /// Sum of reuse counters of the mounted content.
    #[serde(default)]
    pub reuse_count: u64,
    /// Display color (`#RGB` or `#RRGGBB`).
    #[serde(default)]
    pub color: Option<String>,
    /// Display icon name.
    #[serde(default)]
    pub icon: Option<String>,
    /// Display size.
    pub size: f64,
    /// Importance [0, 1].
    pub importance: f64,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Difficulty [1, 5].
    pub difficulty: u8,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            description: String::new(),
            work_count: 0,
            reuse_count: 0,
            color: None,
            icon: None,
            size: 1.0,
            importance: 0.5,
            tags: Vec::new(),
            difficulty: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A topic node in a knowledge graph.
///
/// Nodes hold no references to other nodes; relationships live in edges
/// and are addressed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Identifier, unique within its graph.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Depth in the hierarchy (root = 0).
    pub level: u32,
    /// Parent node id, mirrored from the incoming `CONTAINS` edge.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Layout position.
    #[serde(default)]
    pub position: Position,
    /// Node metadata.
    #[serde(default)]
    pub metadata: NodeMetadata,
    /// Whether the node is rendered.
    pub is_visible: bool,
    /// Locked nodes reject structural updates and removal.
    pub is_locked: bool,
}

impl GraphNode {
    /// Create a visible, unlocked node with default metadata.
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: NodeType, level: u32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            level,
            parent_id: None,
            position: Position::default(),
            metadata: NodeMetadata::default(),
            is_visible: true,
            is_locked: false,
        }
    }

    /// Set the layout position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark the node as locked.
    pub fn locked(mut self) -> Self {
        self.is_locked = true;
        self
    }
}

/// Partial update of node metadata. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMetadataPatch {
    /// New description.
    pub description: Option<String>,
    /// New work count.
    pub work_count: Option<u64>,
    /// New reuse count.
    pub reuse_count: Option<u64>,
    /// New color.
    pub color: Option<String>,
    /// New icon.
    pub icon: Option<String>,
    /// New size.
    pub size: Option<f64>,
    /// New importance, clamped to [0, 1].
    pub importance: Option<f64>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
    /// New difficulty, clamped to [1, 5].
    pub difficulty: Option<u8>,
}

impl NodeMetadataPatch {
    /// Apply the patch. Does not touch `updated_at`.
    pub fn apply_to(self, metadata: &mut NodeMetadata) {
        if let Some(description) = self.description {
            metadata.description = description;
        }
        if let Some(work_count) = self.work_count {
            metadata.work_count = work_count;
        }
        if let Some(reuse_count) = self.reuse_count {
            metadata.reuse_count = reuse_count;
        }
        if let Some(color) = self.color {
            metadata.color = Some(color);
        }
        if let Some(icon) = self.icon {
            metadata.icon = Some(icon);
        }
        if let Some(size) = self.size {
            metadata.size = size;
        }
        if let Some(importance) = self.importance {
            metadata.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(tags) = self.tags {
            metadata.tags = tags;
        }
        if let Some(difficulty) = self.difficulty {
            metadata.difficulty = difficulty.clamp(1, 5);
        }
    }
}

/// Partial update of a node. `None` leaves a field untouched.
///
/// `parent_id` is absent on purpose: it follows `CONTAINS` edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeUpdate {
    /// Rename the node.
    pub id: Option<String>,
    /// New label.
    pub label: Option<String>,
    /// New node kind.
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    /// New level.
    pub level: Option<u32>,
    /// New position.
    pub position: Option<Position>,
    /// Metadata patch.
    pub metadata: Option<NodeMetadataPatch>,
    /// New visibility.
    pub is_visible: Option<bool>,
    /// New lock state.
    pub is_locked: Option<bool>,
}

impl NodeUpdate {
    /// Update that only rewrites the mount counters.
    pub fn counters(work_count: u64, reuse_count: u64) -> Self {
        Self {
            metadata: Some(NodeMetadataPatch {
                work_count: Some(work_count),
                reuse_count: Some(reuse_count),
                ..NodeMetadataPatch::default()
            }),
            ..Self::default()
        }
    }

    /// Drop the fields a locked node does not allow to change.
    pub fn without_structural_fields(mut self) -> Self {
        self.id = None;
        self.node_type = None;
        self.is_locked = None;
        self
    }
}
