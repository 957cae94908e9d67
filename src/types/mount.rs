//! Mount types binding external content to graph nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a mount came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    /// Attached by the owner.
    #[default]
    Manual,
    /// Accepted from a recommendation.
    Recommendation,
    /// Created by the platform.
    System,
}

impl MountType {
    /// Parse mount type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "recommendation" => Some(Self::Recommendation),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Recommendation => write!(f, "recommendation"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Optional parameters for a mount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MountOptions {
    /// Ordering hint among mounts at the same node.
    pub position: i32,
    /// Make this the primary mount of its content.
    pub is_primary: bool,
    /// Origin of the mount.
    pub mount_type: MountType,
    /// Free-form metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Binding between one content record and one graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMount {
    /// Mount identifier.
    pub id: String,
    /// Owner of the graph the mount lives in.
    pub owner_id: String,
    /// External content identifier.
    pub content_id: String,
    /// Graph identifier.
    pub graph_id: String,
    /// Node identifier within the graph.
    pub node_id: String,
    /// Ordering hint.
    pub position: i32,
    /// Whether this is the canonical mount of its content.
    pub is_primary: bool,
    /// Origin of the mount.
    pub mount_type: MountType,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl WorkMount {
    /// Create a mount with a fresh id. `is_primary` starts false; the
    /// registry promotes it once the mount has committed.
    pub fn new(
        content_id: impl Into<String>,
        graph_id: impl Into<String>,
        node_id: impl Into<String>,
        owner_id: impl Into<String>,
        options: &MountOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            content_id: content_id.into(),
            graph_id: graph_id.into(),
            node_id: node_id.into(),
            position: options.position,
            is_primary: false,
            mount_type: options.mount_type,
            metadata: options.metadata.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this mount binds the given triple.
    pub fn binds(&self, content_id: &str, graph_id: &str, node_id: &str) -> bool {
        self.content_id == content_id && self.graph_id == graph_id && self.node_id == node_id
    }

    /// Ordering used by every mount listing: position, creation time, id.
    pub fn listing_order(a: &Self, b: &Self) -> std::cmp::Ordering {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// External content record as seen by the mount aggregations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    /// Content identifier.
    pub id: String,
    /// How often the content has been reused.
    pub reuse_count: u64,
    /// Subject tag.
    pub subject: Option<String>,
    /// Grade level tag.
    pub grade_level: Option<String>,
    /// Author identifier.
    pub author: Option<String>,
}
