//! In-memory stores for testing and embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{ContentLookup, GraphRepository, MountStore};
use crate::graph::KnowledgeGraph;
use crate::types::{ContentRecord, WorkMount};

/// Error type for in-memory stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryError {
    /// Stored graph version differs from the expected one.
    #[error("Version conflict on graph {graph_id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Graph being saved.
        graph_id: String,
        /// Version the caller loaded.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
    /// Mount not found.
    #[error("Mount not found: {0}")]
    MountNotFound(String),
    /// Triple already bound by another mount.
    #[error("Mount already exists for content {content_id} at {graph_id}/{node_id}")]
    DuplicateMount {
        /// Content id.
        content_id: String,
        /// Graph id.
        graph_id: String,
        /// Node id.
        node_id: String,
    },
}

/// In-memory graph repository.
#[derive(Debug, Default)]
pub struct InMemoryGraphRepository {
    graphs: RwLock<HashMap<String, KnowledgeGraph>>,
}

impl InMemoryGraphRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a graph unconditionally.
    pub fn insert(&self, graph: KnowledgeGraph) {
        self.graphs.write().insert(graph.id.clone(), graph);
    }

    /// Number of stored graphs.
    pub fn len(&self) -> usize {
        self.graphs.read().len()
    }

    /// Whether the repository is empty.
    pub fn is_empty(&self) -> bool {
        self.graphs.read().is_empty()
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    type Error = InMemoryError;

    async fn load(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>, Self::Error> {
        Ok(self.graphs.read().get(graph_id).cloned())
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<(), Self::Error> {
        let mut graphs = self.graphs.write();
        if let Some(stored) = graphs.get(&graph.id) {
            if stored.version() != expected_version {
                return Err(InMemoryError::VersionConflict {
                    graph_id: graph.id.clone(),
                    expected: expected_version,
                    found: stored.version(),
                });
            }
        }
        graphs.insert(graph.id.clone(), graph.clone());
        Ok(())
    }
}

/// In-memory mount store.
#[derive(Debug, Default)]
pub struct InMemoryMountStore {
    mounts: RwLock<HashMap<String, WorkMount>>,
}

impl InMemoryMountStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored mounts.
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }

    fn collect<P>(&self, predicate: P) -> Vec<WorkMount>
    where
        P: Fn(&WorkMount) -> bool,
    {
        let mut result: Vec<WorkMount> = self
            .mounts
            .read()
            .values()
            .filter(|m| predicate(*m))
            .cloned()
            .collect();
        result.sort_by(WorkMount::listing_order);
        result
    }
}

#[async_trait]
impl MountStore for InMemoryMountStore {
    type Error = InMemoryError;

    async fn insert(&self, mount: WorkMount) -> Result<(), Self::Error> {
        let mut mounts = self.mounts.write();
        if mounts
            .values()
            .any(|m| m.binds(&mount.content_id, &mount.graph_id, &mount.node_id))
        {
            return Err(InMemoryError::DuplicateMount {
                content_id: mount.content_id,
                graph_id: mount.graph_id,
                node_id: mount.node_id,
            });
        }
        mounts.insert(mount.id.clone(), mount);
        Ok(())
    }

    async fn update(&self, mount: WorkMount) -> Result<(), Self::Error> {
        let mut mounts = self.mounts.write();
        match mounts.get_mut(&mount.id) {
            Some(slot) => {
                *slot = mount;
                Ok(())
            }
            None => Err(InMemoryError::MountNotFound(mount.id)),
        }
    }

    async fn remove(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error> {
        Ok(self.mounts.write().remove(mount_id))
    }

    async fn get(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error> {
        Ok(self.mounts.read().get(mount_id).cloned())
    }

    async fn find(
        &self,
        content_id: &str,
        graph_id: &str,
        node_id: &str,
    ) -> Result<Option<WorkMount>, Self::Error> {
        Ok(self
            .mounts
            .read()
            .values()
            .find(|m| m.binds(content_id, graph_id, node_id))
            .cloned())
    }

    async fn list_by_node(&self, graph_id: &str, node_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        Ok(self.collect(|m| m.graph_id == graph_id && m.node_id == node_id))
    }

    async fn list_by_graph(&self, graph_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        Ok(self.collect(|m| m.graph_id == graph_id))
    }

    async fn list_by_content(&self, content_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        Ok(self.collect(|m| m.content_id == content_id))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        Ok(self.collect(|m| m.owner_id == owner_id))
    }

    async fn rebind_node(
        &self,
        graph_id: &str,
        old_node_id: &str,
        new_node_id: &str,
    ) -> Result<usize, Self::Error> {
        let mut mounts = self.mounts.write();
        let moving: Vec<String> = mounts
            .values()
            .filter(|m| m.graph_id == graph_id && m.node_id == old_node_id)
            .map(|m| m.content_id.clone())
            .collect();
        if let Some(content_id) = moving
            .iter()
            .find(|content_id| mounts.values().any(|m| m.binds(content_id, graph_id, new_node_id)))
        {
            return Err(InMemoryError::DuplicateMount {
                content_id: content_id.clone(),
                graph_id: graph_id.to_string(),
                node_id: new_node_id.to_string(),
            });
        }

        let now = Utc::now();
        for mount in mounts
            .values_mut()
            .filter(|m| m.graph_id == graph_id && m.node_id == old_node_id)
        {
            mount.node_id = new_node_id.to_string();
            mount.updated_at = now;
        }
        Ok(moving.len())
    }

    fn is_duplicate_mount(error: &Self::Error) -> bool {
        matches!(error, InMemoryError::DuplicateMount { .. })
    }
}

/// In-memory content catalogue.
#[derive(Debug, Default)]
pub struct InMemoryContentLookup {
    records: RwLock<HashMap<String, ContentRecord>>,
}

impl InMemoryContentLookup {
    /// Create a new empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a content record.
    pub fn add_content(&self, record: ContentRecord) {
        self.records.write().insert(record.id.clone(), record);
    }
}

#[async_trait]
impl ContentLookup for InMemoryContentLookup {
    type Error = InMemoryError;

    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, Self::Error> {
        Ok(self.records.read().get(content_id).cloned())
    }

    async fn get_many(&self, content_ids: &[String]) -> Result<Vec<ContentRecord>, Self::Error> {
        let records = self.records.read();
        Ok(content_ids
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }
}
