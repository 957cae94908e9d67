//! # knowledge-graph-kernel
//!
//! Owner-scoped knowledge graphs with content mounts.
//!
//! The kernel keeps one question answerable at all times:
//!
//! > Is this graph still a well-formed hierarchy that every caller can trust?
//!
//! ## Core Contract
//!
//! 1. Node and edge ids are unique; every edge joins two existing nodes
//! 2. Directed edges never close a cycle, and `CONTAINS` gives each node at most one parent
//! 3. Every successful mutation bumps `version` by exactly one; a failed one changes nothing
//! 4. A `(content, graph, node)` triple is mounted at most once, and node counters follow the mounts
//!
//! ## Architecture
//!
//! ```text
//! Caller → MountRegistry → KnowledgeGraph (GraphStore, CycleGuard, Hierarchy, Stats)
//!               ↓                  ↓
//!          MountStore       GraphRepository (Postgres or Memory)
//! ```
//!
//! The kernel does no I/O itself; persistence goes through the traits in [`store`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod graph;
pub mod mount;
pub mod store;
pub mod config;
pub mod canonical;

// Re-exports
pub use types::{
    ContentRecord, EdgeMetadata, EdgeStyle, EdgeType, GraphEdge, GraphNode, MountOptions,
    MountType, NodeMetadata, NodeMetadataPatch, NodeType, NodeUpdate, Position, WorkMount,
};
pub use graph::{
    Capacity, GraphDocument, GraphError, GraphMetadata, GraphStats, GraphType, KnowledgeGraph,
    KNOWLEDGE_GRAPH_SCHEMA_VERSION,
};
pub use mount::{GraphMountStats, MountError, MountRegistry, NodeMountStats};
pub use store::{
    ContentLookup, GraphRepository, InMemoryContentLookup, InMemoryError, InMemoryGraphRepository,
    InMemoryMountStore, MountStore,
};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresError, PostgresStore};
pub use config::{GraphLimits, DEFAULT_MAX_EDGES, DEFAULT_MAX_NODES};
pub use canonical::{canonical_hash, canonical_hash_hex};
