//! Capacity configuration for knowledge graphs.
//!
//! ## Configuration
//!
//! Limits can be overridden via environment variables:
//! - `KG_MAX_NODES`: Maximum nodes per graph (default: 500)
//! - `KG_MAX_EDGES`: Maximum edges per graph (default: 1000)

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default node capacity of a graph.
pub const DEFAULT_MAX_NODES: usize = 500;

/// Default edge capacity of a graph.
pub const DEFAULT_MAX_EDGES: usize = 1000;

/// Capacity limits enforced on every insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLimits {
    /// Maximum number of nodes.
    pub max_nodes: usize,
    /// Maximum number of edges.
    pub max_edges: usize,
}

impl GraphLimits {
    /// Create limits with explicit caps.
    pub fn new(max_nodes: usize, max_edges: usize) -> Self {
        Self { max_nodes, max_edges }
    }

    /// Load limits from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            max_nodes: env_or("KG_MAX_NODES", DEFAULT_MAX_NODES),
            max_edges: env_or("KG_MAX_EDGES", DEFAULT_MAX_EDGES),
        }
    }
}

/// Parse `key` from the environment, or `default` when unset or unparsable.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_edges: DEFAULT_MAX_EDGES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = GraphLimits::default();
        assert_eq!(limits.max_nodes, 500);
        assert_eq!(limits.max_edges, 1000);
    }

    #[test]
    fn test_from_env_ignores_garbage() {
        // Unset or unparsable values fall back to defaults.
        std::env::set_var("KG_MAX_EDGES", "lots");
        let limits = GraphLimits::from_env();
        assert_eq!(limits.max_edges, DEFAULT_MAX_EDGES);
        std::env::remove_var("KG_MAX_EDGES");
    }

    #[test]
    fn test_env_or_parses_set_value() {
        std::env::set_var("KG_TEST_ENV_OR", "42");
        assert_eq!(env_or("KG_TEST_ENV_OR", 7u32), 42);
        std::env::remove_var("KG_TEST_ENV_OR");
        assert_eq!(env_or("KG_TEST_ENV_OR", 7u32), 7);
    }
}
