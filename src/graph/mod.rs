//! The knowledge graph aggregate.
//!
//! A [`KnowledgeGraph`] owns its nodes and edges in id-indexed maps and is
//! the only way to mutate them. Every mutating call validates all of its
//! preconditions first, then applies the change and bumps `version` by
//! exactly one. A failed call changes nothing.
//!
//! ## Invariants
//!
//! 1. Node ids and edge ids are unique within the graph
//! 2. Every edge endpoint names a node of the same graph
//! 3. Directed edges never form a cycle (self-loops included)
//! 4. Node and edge counts stay within [`GraphLimits`]
//! 5. A node has at most one incoming `CONTAINS` edge, and its `parent_id`
//!    mirrors that edge

pub mod cycle;
pub mod error;
pub mod hierarchy;
pub mod stats;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GraphLimits;
use crate::types::{GraphEdge, GraphNode, NodeUpdate};

pub use error::{Capacity, GraphError};
pub use stats::GraphStats;

/// Kind of knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphType {
    /// Map of a single subject.
    #[default]
    Subject,
    /// Ordered course of study.
    Curriculum,
    /// Personal study map.
    Personal,
    /// Reusable template.
    Template,
}

/// Graph-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last successful mutation.
    pub updated_at: DateTime<Utc>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for GraphMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        }
    }
}

/// Per-owner graph of topic nodes and the edges between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct KnowledgeGraph {
    /// Graph identifier.
    pub id: String,
    /// Owning user.
    pub owner_id: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Kind of graph.
    pub graph_type: GraphType,
    /// Subject tag.
    pub subject: Option<String>,
    /// Grade level tag.
    pub grade_level: Option<String>,
    /// Layout configuration, opaque to the kernel.
    pub layout: serde_json::Value,
    /// View configuration, opaque to the kernel.
    pub view: serde_json::Value,
    /// Whether the graph is publicly visible.
    pub is_public: bool,
    /// Template this graph was created from.
    pub template_id: Option<String>,
    /// Graph-level metadata.
    pub metadata: GraphMetadata,
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<String, GraphEdge>,
    /// Node id -> ids of edges leaving it.
    outgoing: HashMap<String, BTreeSet<String>>,
    /// Node id -> ids of edges entering it.
    incoming: HashMap<String, BTreeSet<String>>,
    version: u64,
    limits: GraphLimits,
}

impl KnowledgeGraph {
    /// Create an empty graph at version 0.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: String::new(),
            graph_type: GraphType::default(),
            subject: None,
            grade_level: None,
            layout: serde_json::Value::Null,
            view: serde_json::Value::Null,
            is_public: false,
            template_id: None,
            metadata: GraphMetadata::default(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            version: 0,
            limits: GraphLimits::default(),
        }
    }

    /// Use custom capacity limits.
    pub fn with_limits(mut self, limits: GraphLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the graph type.
    pub fn with_type(mut self, graph_type: GraphType) -> Self {
        self.graph_type = graph_type;
        self
    }

    /// Set the subject and grade level tags.
    pub fn with_tags(mut self, subject: Option<String>, grade_level: Option<String>) -> Self {
        self.subject = subject;
        self.grade_level = grade_level;
        self
    }

    /// Current version. Increases by one on every successful mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Capacity limits in force.
    pub fn limits(&self) -> GraphLimits {
        self.limits
    }

    /// Look up a node by id.
    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Look up an edge by id.
    pub fn get_edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.get(id)
    }

    /// Iterate over all nodes (unordered).
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Iterate over all edges (unordered).
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges leaving a node, ordered by edge id.
    pub fn outgoing_edges(&self, node_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.outgoing
            .get(node_id)
            .into_iter()
            .flatten()
            .filter_map(move |edge_id| self.edges.get(edge_id))
    }

    /// Edges entering a node, ordered by edge id.
    pub fn incoming_edges(&self, node_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.incoming
            .get(node_id)
            .into_iter()
            .flatten()
            .filter_map(move |edge_id| self.edges.get(edge_id))
    }

    /// Insert a node.
    pub fn add_node(&mut self, mut node: GraphNode) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        if self.nodes.len() >= self.limits.max_nodes {
            return Err(GraphError::CapacityExceeded {
                kind: Capacity::Nodes,
                limit: self.limits.max_nodes,
            });
        }
        validate_id("node id", &node.id)?;
        validate_color(node.metadata.color.as_deref())?;

        node.metadata.importance = node.metadata.importance.clamp(0.0, 1.0);
        node.metadata.difficulty = node.metadata.difficulty.clamp(1, 5);
        // A fresh node has no incoming CONTAINS edge yet.
        node.parent_id = None;

        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.commit();
        debug!(graph_id = %self.id, node_id = %id, version = self.version, "Node added");
        Ok(())
    }

    /// Apply a partial update to a node.
    ///
    /// On a locked node `id`, `type` and `is_locked` are dropped from the
    /// update and the rest is applied. Renaming re-points every edge and
    /// child reference in the same mutation. A node with mounted content
    /// (`work_count > 0`) can only be renamed through
    /// [`MountRegistry::rename_node`](crate::mount::MountRegistry::rename_node).
    pub fn update_node(&mut self, id: &str, updates: NodeUpdate) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        let updates = if node.is_locked {
            updates.without_structural_fields()
        } else {
            updates
        };

        let mounted = node.metadata.work_count > 0;

        let rename = updates.id.clone().filter(|new_id| new_id != id);
        if let Some(new_id) = &rename {
            if mounted {
                return Err(GraphError::MountedNode(id.to_string()));
            }
            validate_id("node id", new_id)?;
            if self.nodes.contains_key(new_id) {
                return Err(GraphError::DuplicateId(new_id.clone()));
            }
        }
        if let Some(patch) = &updates.metadata {
            validate_color(patch.color.as_deref())?;
        }

        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        if let Some(label) = updates.label {
            node.label = label;
        }
        if let Some(node_type) = updates.node_type {
            node.node_type = node_type;
        }
        if let Some(level) = updates.level {
            node.level = level;
        }
        if let Some(position) = updates.position {
            node.position = position;
        }
        if let Some(patch) = updates.metadata {
            patch.apply_to(&mut node.metadata);
        }
        if let Some(is_visible) = updates.is_visible {
            node.is_visible = is_visible;
        }
        if let Some(is_locked) = updates.is_locked {
            node.is_locked = is_locked;
        }
        node.metadata.updated_at = Utc::now();

        if let Some(new_id) = &rename {
            self.rename_node(id, new_id);
        }
        self.commit();
        debug!(graph_id = %self.id, node_id = %id, version = self.version, "Node updated");
        Ok(())
    }

    /// Remove an unlocked node and every edge touching it.
    ///
    /// The cascade counts as one mutation.
    pub fn remove_node(&mut self, id: &str) -> Result<GraphNode, GraphError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        if node.is_locked {
            warn!(graph_id = %self.id, node_id = %id, "Refusing to remove locked node");
            return Err(GraphError::LockedNode(id.to_string()));
        }

        let touching: BTreeSet<String> = self
            .outgoing
            .get(id)
            .into_iter()
            .chain(self.incoming.get(id))
            .flatten()
            .cloned()
            .collect();
        for edge_id in &touching {
            self.detach_edge(edge_id);
        }

        let removed = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        self.outgoing.remove(id);
        self.incoming.remove(id);
        self.commit();
        debug!(
            graph_id = %self.id,
            node_id = %id,
            cascaded_edges = touching.len(),
            version = self.version,
            "Node removed"
        );
        Ok(removed)
    }

    /// Insert an edge.
    ///
    /// `CONTAINS` edges are always treated as directed, and a child may
    /// have only one of them.
    pub fn add_edge(&mut self, mut edge: GraphEdge) -> Result<(), GraphError> {
        if edge.edge_type.is_hierarchical() {
            edge.is_directed = true;
        }
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateId(edge.id));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::NodeNotFound(endpoint.clone()));
            }
        }
        if edge.is_directed && self.would_create_cycle(&edge.source, &edge.target) {
            warn!(
                graph_id = %self.id,
                source = %edge.source,
                target = %edge.target,
                "Rejecting edge that would create a cycle"
            );
            return Err(GraphError::WouldCreateCycle {
                from: edge.source,
                to: edge.target,
            });
        }
        if edge.edge_type.is_hierarchical() {
            if let Some(parent) = self.parent_id_of(&edge.target) {
                return Err(GraphError::MultipleParents {
                    child: edge.target,
                    existing_parent: parent.to_string(),
                });
            }
        }
        if self.edges.len() >= self.limits.max_edges {
            return Err(GraphError::CapacityExceeded {
                kind: Capacity::Edges,
                limit: self.limits.max_edges,
            });
        }
        validate_id("edge id", &edge.id)?;
        validate_color(edge.metadata.color.as_deref())?;

        edge.weight = edge.weight.clamp(0.0, 1.0);
        edge.metadata.strength = edge.metadata.strength.clamp(0.0, 1.0);

        if edge.edge_type.is_hierarchical() {
            if let Some(child) = self.nodes.get_mut(&edge.target) {
                child.parent_id = Some(edge.source.clone());
            }
        }
        self.index_edge(&edge);
        let id = edge.id.clone();
        self.edges.insert(id.clone(), edge);
        self.commit();
        debug!(graph_id = %self.id, edge_id = %id, version = self.version, "Edge added");
        Ok(())
    }

    /// Remove an edge.
    pub fn remove_edge(&mut self, id: &str) -> Result<GraphEdge, GraphError> {
        let edge = self
            .detach_edge(id)
            .ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))?;
        self.commit();
        debug!(graph_id = %self.id, edge_id = %id, version = self.version, "Edge removed");
        Ok(edge)
    }

    /// Rename a node regardless of its mount counters.
    ///
    /// Callers must move the node's mounts to `new_id` alongside.
    pub(crate) fn rename_mounted_node(&mut self, id: &str, new_id: &str) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        if node.is_locked {
            warn!(graph_id = %self.id, node_id = %id, "Refusing to rename locked node");
            return Err(GraphError::LockedNode(id.to_string()));
        }
        validate_id("node id", new_id)?;
        if self.nodes.contains_key(new_id) {
            return Err(GraphError::DuplicateId(new_id.to_string()));
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.metadata.updated_at = Utc::now();
        }
        self.rename_node(id, new_id);
        self.commit();
        debug!(graph_id = %self.id, node_id = %new_id, renamed_from = %id, version = self.version, "Node renamed");
        Ok(())
    }

    /// Whether a directed edge `source -> target` would close a cycle.
    pub fn would_create_cycle(&self, source: &str, target: &str) -> bool {
        match self.nodes.get_key_value(target) {
            Some((target, _)) => cycle::would_create_cycle(source, target, |id| {
                self.outgoing_edges(id)
                    .filter(|edge| edge.is_directed)
                    .map(|edge| edge.target.as_str())
            }),
            None => source == target,
        }
    }

    /// Source of the `CONTAINS` edge entering `node_id`, if any.
    pub(crate) fn parent_id_of(&self, node_id: &str) -> Option<&str> {
        self.incoming_edges(node_id)
            .find(|edge| edge.edge_type.is_hierarchical())
            .map(|edge| edge.source.as_str())
    }

    fn commit(&mut self) {
        self.version += 1;
        self.metadata.updated_at = Utc::now();
    }

    fn index_edge(&mut self, edge: &GraphEdge) {
        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.id.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.id.clone());
    }

    /// Remove an edge from the maps and indexes without bumping the version.
    fn detach_edge(&mut self, edge_id: &str) -> Option<GraphEdge> {
        let edge = self.edges.remove(edge_id)?;
        unindex(&mut self.outgoing, &edge.source, edge_id);
        unindex(&mut self.incoming, &edge.target, edge_id);

        if edge.edge_type.is_hierarchical() {
            if let Some(child) = self.nodes.get_mut(&edge.target) {
                if child.parent_id.as_deref() == Some(edge.source.as_str()) {
                    child.parent_id = None;
                }
            }
        }
        Some(edge)
    }

    fn rename_node(&mut self, old_id: &str, new_id: &str) {
        let Some(mut node) = self.nodes.remove(old_id) else {
            return;
        };
        node.id = new_id.to_string();
        self.nodes.insert(new_id.to_string(), node);

        if let Some(edge_ids) = self.outgoing.remove(old_id) {
            for edge_id in &edge_ids {
                if let Some(edge) = self.edges.get_mut(edge_id) {
                    edge.source = new_id.to_string();
                }
            }
            self.outgoing.insert(new_id.to_string(), edge_ids);
        }
        if let Some(edge_ids) = self.incoming.remove(old_id) {
            for edge_id in &edge_ids {
                if let Some(edge) = self.edges.get_mut(edge_id) {
                    edge.target = new_id.to_string();
                }
            }
            self.incoming.insert(new_id.to_string(), edge_ids);
        }
        for node in self.nodes.values_mut() {
            if node.parent_id.as_deref() == Some(old_id) {
                node.parent_id = Some(new_id.to_string());
            }
        }
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<String>>, node_id: &str, edge_id: &str) {
    if let Some(set) = index.get_mut(node_id) {
        set.remove(edge_id);
        if set.is_empty() {
            index.remove(node_id);
        }
    }
}

fn validate_id(field: &'static str, id: &str) -> Result<(), GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn color_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}){1,2}$").ok())
        .as_ref()
}

fn validate_color(color: Option<&str>) -> Result<(), GraphError> {
    match color {
        Some(color) if !color_pattern().is_some_and(|re| re.is_match(color)) => {
            Err(GraphError::InvalidField {
                field: "color",
                reason: format!("expected #RGB or #RRGGBB, got {color:?}"),
            })
        }
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persisted shape
// ─────────────────────────────────────────────────────────────────────────────

/// Layout version stamped into every [`GraphDocument`].
pub const KNOWLEDGE_GRAPH_SCHEMA_VERSION: &str = "1.0.0";

fn current_schema_version() -> String {
    KNOWLEDGE_GRAPH_SCHEMA_VERSION.to_string()
}

/// Serialized form of a [`KnowledgeGraph`].
///
/// Adjacency indexes are derived and never stored; they are rebuilt when a
/// document is turned back into a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    /// Documents written before the field existed read as the current layout.
    #[serde(default = "current_schema_version")]
    schema_version: String,
    id: String,
    owner_id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    graph_type: GraphType,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    grade_level: Option<String>,
    #[serde(default)]
    nodes: BTreeMap<String, GraphNode>,
    #[serde(default)]
    edges: BTreeMap<String, GraphEdge>,
    #[serde(default)]
    layout: serde_json::Value,
    #[serde(default)]
    view: serde_json::Value,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    is_public: bool,
    #[serde(default)]
    template_id: Option<String>,
    #[serde(default)]
    metadata: GraphMetadata,
}

impl From<KnowledgeGraph> for GraphDocument {
    fn from(graph: KnowledgeGraph) -> Self {
        Self {
            schema_version: current_schema_version(),
            id: graph.id,
            owner_id: graph.owner_id,
            name: graph.name,
            description: graph.description,
            graph_type: graph.graph_type,
            subject: graph.subject,
            grade_level: graph.grade_level,
            nodes: graph.nodes.into_iter().collect(),
            edges: graph.edges.into_iter().collect(),
            layout: graph.layout,
            view: graph.view,
            version: graph.version,
            is_public: graph.is_public,
            template_id: graph.template_id,
            metadata: graph.metadata,
        }
    }
}

impl TryFrom<GraphDocument> for KnowledgeGraph {
    type Error = GraphError;

    /// Rebuild a graph through the same checks as live mutations.
    ///
    /// Nodes and edges are replayed in id order through `add_node` and
    /// `add_edge`, so a stored document that breaks uniqueness, endpoints,
    /// acyclicity, the single-parent rule or the default limits is rejected.
    /// `parent_id` is recomputed from the `CONTAINS` edges.
    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        if doc.schema_version != KNOWLEDGE_GRAPH_SCHEMA_VERSION {
            return Err(GraphError::UnsupportedSchema {
                found: doc.schema_version,
                expected: KNOWLEDGE_GRAPH_SCHEMA_VERSION,
            });
        }

        let mut graph = KnowledgeGraph::new(doc.id, doc.owner_id, doc.name);
        graph.description = doc.description;
        graph.graph_type = doc.graph_type;
        graph.subject = doc.subject;
        graph.grade_level = doc.grade_level;
        graph.layout = doc.layout;
        graph.view = doc.view;
        graph.is_public = doc.is_public;
        graph.template_id = doc.template_id;

        for node in doc.nodes.into_values() {
            graph.add_node(node)?;
        }
        for edge in doc.edges.into_values() {
            graph.add_edge(edge)?;
        }

        graph.version = doc.version;
        graph.metadata = doc.metadata;
        Ok(graph)
    }
}
