//! Core types for the knowledge graph kernel.

pub mod node;
pub mod edge;
pub mod mount;

pub use node::{GraphNode, NodeMetadata, NodeMetadataPatch, NodeType, NodeUpdate, Position};
pub use edge::{EdgeMetadata, EdgeStyle, EdgeType, GraphEdge};
pub use mount::{ContentRecord, MountOptions, MountType, WorkMount};
