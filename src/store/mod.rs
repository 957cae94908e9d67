//! Persistence adapters.
//!
//! The kernel performs no I/O of its own. Graphs, mounts and content records
//! are reached through these traits; [`memory`] backs tests and embedders,
//! [`postgres`] (feature `postgres`) backs production.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::graph::KnowledgeGraph;
use crate::types::{ContentRecord, WorkMount};

/// Load/save access to knowledge graphs.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Error type for repository operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a graph by id.
    async fn load(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>, Self::Error>;

    /// Store a graph.
    ///
    /// Upsert guarded by compare-and-swap: if a stored copy exists, its
    /// version must equal `expected_version` or the save fails with a
    /// conflict and nothing is written.
    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<(), Self::Error>;
}

/// Storage for mount records.
///
/// Listings are ordered by `position`, then `created_at`, then `id`.
#[async_trait]
pub trait MountStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert a new mount. Must reject a second mount of the same
    /// `(content_id, graph_id, node_id)` triple.
    async fn insert(&self, mount: WorkMount) -> Result<(), Self::Error>;

    /// Replace an existing mount.
    async fn update(&self, mount: WorkMount) -> Result<(), Self::Error>;

    /// Remove a mount, returning it if it existed.
    async fn remove(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error>;

    /// Fetch a mount by id.
    async fn get(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error>;

    /// Fetch the mount binding a triple.
    async fn find(
        &self,
        content_id: &str,
        graph_id: &str,
        node_id: &str,
    ) -> Result<Option<WorkMount>, Self::Error>;

    /// All mounts at a node.
    async fn list_by_node(&self, graph_id: &str, node_id: &str) -> Result<Vec<WorkMount>, Self::Error>;

    /// All mounts in a graph.
    async fn list_by_graph(&self, graph_id: &str) -> Result<Vec<WorkMount>, Self::Error>;

    /// All mounts of a content record.
    async fn list_by_content(&self, content_id: &str) -> Result<Vec<WorkMount>, Self::Error>;

    /// All mounts created by an owner.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkMount>, Self::Error>;

    /// Move every mount at `graph_id/old_node_id` to `new_node_id`.
    ///
    /// All or nothing: fails without moving anything if a moved mount would
    /// collide with a triple already bound at the new node. Returns the
    /// number of mounts moved.
    async fn rebind_node(
        &self,
        graph_id: &str,
        old_node_id: &str,
        new_node_id: &str,
    ) -> Result<usize, Self::Error>;

    /// Whether `error` is the duplicate-triple rejection from [`insert`](Self::insert).
    fn is_duplicate_mount(_error: &Self::Error) -> bool {
        false
    }
}

/// Read access to external content records.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    /// Error type for lookups.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch one record.
    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, Self::Error>;

    /// Fetch several records; unknown ids are skipped.
    async fn get_many(&self, content_ids: &[String]) -> Result<Vec<ContentRecord>, Self::Error>;
}

pub use memory::{InMemoryContentLookup, InMemoryError, InMemoryGraphRepository, InMemoryMountStore};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresError, PostgresStore};
