//! Content mounts on graph nodes.
//!
//! [`MountRegistry`] binds external content ids to nodes and keeps each
//! node's `work_count`/`reuse_count` in step with its mounts. The mount
//! record and the graph are separate aggregates; every write that touches
//! both runs as insert-then-save, and the mount write is compensated if the
//! graph save fails.

pub mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::graph::{GraphError, KnowledgeGraph};
use crate::store::{ContentLookup, GraphRepository, MountStore};
use crate::types::{MountOptions, NodeUpdate, WorkMount};

pub use stats::{GraphMountStats, NodeMountStats};

/// Errors from mount operations.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    /// Graph does not exist.
    #[error("Graph not found: {0}")]
    GraphNotFound(String),
    /// Node does not exist in the graph.
    #[error("Node {node_id} not found in graph {graph_id}")]
    NodeNotFound {
        /// Graph id.
        graph_id: String,
        /// Node id.
        node_id: String,
    },
    /// Mount does not exist.
    #[error("Mount not found: {0}")]
    MountNotFound(String),
    /// Caller does not own the graph.
    #[error("{owner_id} may not mount into graph {graph_id}")]
    PermissionDenied {
        /// Graph id.
        graph_id: String,
        /// Rejected caller.
        owner_id: String,
    },
    /// Triple already mounted.
    #[error("Content {content_id} is already mounted at {graph_id}/{node_id}")]
    DuplicateMount {
        /// Content id.
        content_id: String,
        /// Graph id.
        graph_id: String,
        /// Node id.
        node_id: String,
    },
    /// Counter write-back rejected by the graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Persistence failure, passed through unchanged.
    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MountError {
    fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store(Box::new(err))
    }
}

/// Coordinates mount records, graphs and content lookups.
pub struct MountRegistry<G, M, C> {
    graphs: Arc<G>,
    mounts: Arc<M>,
    content: Arc<C>,
}

impl<G, M, C> Clone for MountRegistry<G, M, C> {
    fn clone(&self) -> Self {
        Self {
            graphs: Arc::clone(&self.graphs),
            mounts: Arc::clone(&self.mounts),
            content: Arc::clone(&self.content),
        }
    }
}

impl<G, M, C> MountRegistry<G, M, C>
where
    G: GraphRepository,
    M: MountStore,
    C: ContentLookup,
{
    /// Create a registry over the given stores.
    pub fn new(graphs: Arc<G>, mounts: Arc<M>, content: Arc<C>) -> Self {
        Self {
            graphs,
            mounts,
            content,
        }
    }

    /// Mount `content_id` at `graph_id/node_id` on behalf of `owner_id`.
    ///
    /// The node's counters are recomputed and saved with the mount. If that
    /// save fails the mount record is removed again and the save error is
    /// returned.
    #[tracing::instrument(skip(self, options))]
    pub async fn mount(
        &self,
        content_id: &str,
        graph_id: &str,
        node_id: &str,
        owner_id: &str,
        options: MountOptions,
    ) -> Result<WorkMount, MountError> {
        let graph = self.load_graph(graph_id).await?;
        if graph.get_node(node_id).is_none() {
            return Err(MountError::NodeNotFound {
                graph_id: graph_id.to_string(),
                node_id: node_id.to_string(),
            });
        }
        if graph.owner_id != owner_id {
            return Err(MountError::PermissionDenied {
                graph_id: graph_id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        if self.is_work_mounted(content_id, graph_id, node_id).await? {
            return Err(MountError::DuplicateMount {
                content_id: content_id.to_string(),
                graph_id: graph_id.to_string(),
                node_id: node_id.to_string(),
            });
        }

        let mount = WorkMount::new(content_id, graph_id, node_id, owner_id, &options);
        // The lookup above can race a concurrent mount of the same triple.
        if let Err(err) = self.mounts.insert(mount.clone()).await {
            if M::is_duplicate_mount(&err) {
                return Err(MountError::DuplicateMount {
                    content_id: content_id.to_string(),
                    graph_id: graph_id.to_string(),
                    node_id: node_id.to_string(),
                });
            }
            return Err(MountError::store(err));
        }

        if let Err(err) = self.sync_node_counters(graph, node_id).await {
            error!(mount_id = %mount.id, error = %err, "Counter write-back failed, removing mount");
            if let Err(rollback) = self.mounts.remove(&mount.id).await {
                error!(mount_id = %mount.id, error = %rollback, "Mount rollback failed");
            }
            return Err(err);
        }

        info!(mount_id = %mount.id, "Mounted content");

        if options.is_primary {
            return self.set_primary(&mount.id).await;
        }
        Ok(mount)
    }

    /// Remove a mount and recompute its node's counters.
    ///
    /// If the graph or node no longer exists only the mount is removed.
    #[tracing::instrument(skip(self))]
    pub async fn unmount(&self, mount_id: &str) -> Result<WorkMount, MountError> {
        let mount = self
            .mounts
            .get(mount_id)
            .await
            .map_err(MountError::store)?
            .ok_or_else(|| MountError::MountNotFound(mount_id.to_string()))?;
        let graph = self
            .graphs
            .load(&mount.graph_id)
            .await
            .map_err(MountError::store)?;

        let removed = self
            .mounts
            .remove(mount_id)
            .await
            .map_err(MountError::store)?
            .ok_or_else(|| MountError::MountNotFound(mount_id.to_string()))?;

        match graph {
            Some(graph) if graph.get_node(&removed.node_id).is_some() => {
                if let Err(err) = self.sync_node_counters(graph, &removed.node_id).await {
                    error!(mount_id, error = %err, "Counter write-back failed, restoring mount");
                    if let Err(rollback) = self.mounts.insert(removed).await {
                        error!(mount_id, error = %rollback, "Mount restore failed");
                    }
                    return Err(err);
                }
            }
            _ => debug!(mount_id, "Target node is gone, skipping counter write-back"),
        }

        info!(mount_id, "Unmounted content");
        Ok(removed)
    }

    /// Rename a node and move its mounts along with it.
    ///
    /// The mounts are rebound first, then the graph is saved. If the save
    /// fails the moved mounts are written back as they were.
    #[tracing::instrument(skip(self))]
    pub async fn rename_node(
        &self,
        graph_id: &str,
        node_id: &str,
        new_node_id: &str,
        owner_id: &str,
    ) -> Result<KnowledgeGraph, MountError> {
        let mut graph = self.load_graph(graph_id).await?;
        if graph.get_node(node_id).is_none() {
            return Err(MountError::NodeNotFound {
                graph_id: graph_id.to_string(),
                node_id: node_id.to_string(),
            });
        }
        if graph.owner_id != owner_id {
            return Err(MountError::PermissionDenied {
                graph_id: graph_id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }

        let expected = graph.version();
        graph.rename_mounted_node(node_id, new_node_id)?;

        let previous = self
            .mounts
            .list_by_node(graph_id, node_id)
            .await
            .map_err(MountError::store)?;
        let moved = self
            .mounts
            .rebind_node(graph_id, node_id, new_node_id)
            .await
            .map_err(MountError::store)?;

        if let Err(err) = self.graphs.save(&graph, expected).await {
            error!(graph_id, node_id, error = %err, "Graph save failed, moving mounts back");
            for mount in previous {
                let mount_id = mount.id.clone();
                if let Err(rollback) = self.mounts.update(mount).await {
                    error!(mount_id = %mount_id, error = %rollback, "Mount restore failed");
                }
            }
            return Err(MountError::store(err));
        }

        info!(graph_id, node_id, new_node_id, moved, "Renamed node");
        Ok(graph)
    }

    /// Make `mount_id` the only primary mount of its content.
    #[tracing::instrument(skip(self))]
    pub async fn set_primary(&self, mount_id: &str) -> Result<WorkMount, MountError> {
        let mut target = self
            .mounts
            .get(mount_id)
            .await
            .map_err(MountError::store)?
            .ok_or_else(|| MountError::MountNotFound(mount_id.to_string()))?;
        let siblings = self
            .mounts
            .list_by_content(&target.content_id)
            .await
            .map_err(MountError::store)?;

        let now = Utc::now();
        for mut other in siblings
            .into_iter()
            .filter(|m| m.is_primary && m.id != target.id)
        {
            debug!(demoted = %other.id, "Clearing previous primary");
            other.is_primary = false;
            other.updated_at = now;
            self.mounts.update(other).await.map_err(MountError::store)?;
        }

        target.is_primary = true;
        target.updated_at = now;
        self.mounts
            .update(target.clone())
            .await
            .map_err(MountError::store)?;
        Ok(target)
    }

    /// Mount activity at one node.
    pub async fn get_node_stats(
        &self,
        graph_id: &str,
        node_id: &str,
    ) -> Result<NodeMountStats, MountError> {
        let mounts = self
            .mounts
            .list_by_node(graph_id, node_id)
            .await
            .map_err(MountError::store)?;
        self.aggregate(&mounts).await
    }

    /// Mount activity summed over the graph's current nodes.
    ///
    /// Mounts pointing at nodes that no longer exist are ignored.
    pub async fn get_graph_stats(&self, graph_id: &str) -> Result<GraphMountStats, MountError> {
        let graph = self.load_graph(graph_id).await?;
        let mounts = self
            .mounts
            .list_by_graph(graph_id)
            .await
            .map_err(MountError::store)?;

        let mut by_node: BTreeMap<String, Vec<WorkMount>> = BTreeMap::new();
        for mount in mounts {
            if graph.get_node(&mount.node_id).is_some() {
                by_node.entry(mount.node_id.clone()).or_default().push(mount);
            }
        }

        let mut per_node = Vec::with_capacity(by_node.len());
        for node_mounts in by_node.values() {
            per_node.push(self.aggregate(node_mounts).await?);
        }
        Ok(GraphMountStats::from_nodes(&per_node))
    }

    /// Whether the triple is already mounted.
    pub async fn is_work_mounted(
        &self,
        content_id: &str,
        graph_id: &str,
        node_id: &str,
    ) -> Result<bool, MountError> {
        Ok(self
            .mounts
            .find(content_id, graph_id, node_id)
            .await
            .map_err(MountError::store)?
            .is_some())
    }

    /// Mounts at a node.
    pub async fn list_by_node(
        &self,
        graph_id: &str,
        node_id: &str,
    ) -> Result<Vec<WorkMount>, MountError> {
        self.mounts
            .list_by_node(graph_id, node_id)
            .await
            .map_err(MountError::store)
    }

    /// Mounts of a content record.
    pub async fn list_by_content(&self, content_id: &str) -> Result<Vec<WorkMount>, MountError> {
        self.mounts
            .list_by_content(content_id)
            .await
            .map_err(MountError::store)
    }

    /// Mounts created by an owner.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkMount>, MountError> {
        self.mounts
            .list_by_owner(owner_id)
            .await
            .map_err(MountError::store)
    }

    async fn load_graph(&self, graph_id: &str) -> Result<KnowledgeGraph, MountError> {
        self.graphs
            .load(graph_id)
            .await
            .map_err(MountError::store)?
            .ok_or_else(|| MountError::GraphNotFound(graph_id.to_string()))
    }

    async fn aggregate(&self, mounts: &[WorkMount]) -> Result<NodeMountStats, MountError> {
        let mut content_ids: Vec<String> = mounts.iter().map(|m| m.content_id.clone()).collect();
        content_ids.sort_unstable();
        content_ids.dedup();

        let records = self
            .content
            .get_many(&content_ids)
            .await
            .map_err(MountError::store)?;
        Ok(NodeMountStats::aggregate(mounts, &records))
    }

    /// Write the node's current mount counters back and save the graph.
    async fn sync_node_counters(
        &self,
        mut graph: KnowledgeGraph,
        node_id: &str,
    ) -> Result<(), MountError> {
        let stats = self.get_node_stats(&graph.id, node_id).await?;
        let expected = graph.version();

        graph.update_node(
            node_id,
            NodeUpdate::counters(stats.work_count, stats.total_reuse_count),
        )?;
        self.graphs
            .save(&graph, expected)
            .await
            .map_err(MountError::store)?;

        debug!(
            graph_id = %graph.id,
            node_id,
            work_count = stats.work_count,
            reuse_count = stats.total_reuse_count,
            version = graph.version(),
            "Synced node counters"
        );
        Ok(())
    }
}
