//! Errors raised by graph mutations.

use std::fmt;

/// Which collection a capacity limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Node collection.
    Nodes,
    /// Edge collection.
    Edges,
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes => write!(f, "nodes"),
            Self::Edges => write!(f, "edges"),
        }
    }
}

/// Error type for graph operations.
///
/// Every variant is raised before any change is applied, so a failed call
/// leaves the graph (and its version) untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A node or edge with this id already exists.
    #[error("Duplicate id: {0}")]
    DuplicateId(String),
    /// The collection is at its configured limit.
    #[error("Capacity exceeded: {kind} limit is {limit}")]
    CapacityExceeded {
        /// Collection that is full.
        kind: Capacity,
        /// Configured limit.
        limit: usize,
    },
    /// Node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    /// Edge not found.
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),
    /// The directed edge would close a cycle.
    #[error("Edge {from} -> {to} would create a cycle")]
    WouldCreateCycle {
        /// Proposed source node.
        from: String,
        /// Proposed target node.
        to: String,
    },
    /// The node is locked.
    #[error("Node is locked: {0}")]
    LockedNode(String),
    /// The node has mounted content, so its id cannot change here.
    #[error("Node {0} has mounted content and must be renamed through the mount registry")]
    MountedNode(String),
    /// The child already has a hierarchical parent.
    #[error("Node {child} already has parent {existing_parent}")]
    MultipleParents {
        /// Child node.
        child: String,
        /// Parent it already has.
        existing_parent: String,
    },
    /// A field value is out of its allowed domain.
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// A stored document uses an unknown layout version.
    #[error("Unsupported graph document schema {found} (expected {expected})")]
    UnsupportedSchema {
        /// Version found in the document.
        found: String,
        /// Version this build reads and writes.
        expected: &'static str,
    },
}
