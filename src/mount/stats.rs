//! Aggregation of mounts joined with their content records.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContentRecord, WorkMount};

/// Mount activity at one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMountStats {
    /// Number of mounts at the node.
    pub work_count: u64,
    /// Sum of the mounted contents' reuse counters.
    pub total_reuse_count: u64,
    /// Distinct subjects, sorted.
    pub subjects: Vec<String>,
    /// Distinct grade levels, sorted.
    pub grade_levels: Vec<String>,
    /// Distinct authors, sorted.
    pub authors: Vec<String>,
    /// Latest `updated_at` among the mounts.
    pub last_activity: Option<DateTime<Utc>>,
}

impl NodeMountStats {
    /// Join `mounts` with `records`.
    ///
    /// Every mount counts toward `work_count`; a mount whose content has no
    /// record contributes nothing else.
    pub fn aggregate(mounts: &[WorkMount], records: &[ContentRecord]) -> Self {
        let by_id: HashMap<&str, &ContentRecord> =
            records.iter().map(|record| (record.id.as_str(), record)).collect();

        let mut subjects = BTreeSet::new();
        let mut grade_levels = BTreeSet::new();
        let mut authors = BTreeSet::new();
        let mut total_reuse_count = 0u64;

        for record in mounts.iter().filter_map(|m| by_id.get(m.content_id.as_str())) {
            total_reuse_count += record.reuse_count;
            subjects.extend(record.subject.iter().cloned());
            grade_levels.extend(record.grade_level.iter().cloned());
            authors.extend(record.author.iter().cloned());
        }

        Self {
            work_count: mounts.len() as u64,
            total_reuse_count,
            subjects: subjects.into_iter().collect(),
            grade_levels: grade_levels.into_iter().collect(),
            authors: authors.into_iter().collect(),
            last_activity: mounts.iter().map(|m| m.updated_at).max(),
        }
    }
}

/// Mount activity across a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMountStats {
    /// Mounts across all nodes.
    pub total_work_count: u64,
    /// Reuse counters summed per node.
    pub total_reuse_count: u64,
    /// Nodes with at least one mount.
    pub node_count: usize,
    /// `total_work_count / node_count`, 0 when no node has mounts.
    pub avg_works_per_node: f64,
    /// Latest activity across nodes.
    pub last_activity: Option<DateTime<Utc>>,
}

impl GraphMountStats {
    /// Fold per-node stats into a graph total.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeMountStats>) -> Self {
        let mut stats = Self::default();
        for node in nodes.into_iter().filter(|n| n.work_count > 0) {
            stats.total_work_count += node.work_count;
            stats.total_reuse_count += node.total_reuse_count;
            stats.node_count += 1;
            stats.last_activity = stats.last_activity.max(node.last_activity);
        }
        if stats.node_count > 0 {
            stats.avg_works_per_node = stats.total_work_count as f64 / stats.node_count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MountOptions;
    use chrono::Duration;

    fn record(id: &str, reuse: u64, subject: &str, author: Option<&str>) -> ContentRecord {
        ContentRecord {
            id: id.into(),
            reuse_count: reuse,
            subject: Some(subject.into()),
            grade_level: Some("7".into()),
            author: author.map(Into::into),
        }
    }

    fn mount(content: &str) -> WorkMount {
        WorkMount::new(content, "g1", "n1", "owner", &MountOptions::default())
    }

    #[test]
    fn test_aggregate_joins_records() {
        let mut late = mount("c2");
        late.updated_at += Duration::seconds(30);
        let mounts = vec![mount("c1"), late.clone(), mount("c3")];
        let records = vec![
            record("c1", 3, "math", Some("ada")),
            record("c2", 4, "algebra", Some("ada")),
        ];

        let stats = NodeMountStats::aggregate(&mounts, &records);
        assert_eq!(stats.work_count, 3);
        assert_eq!(stats.total_reuse_count, 7);
        assert_eq!(stats.subjects, vec!["algebra", "math"]);
        assert_eq!(stats.grade_levels, vec!["7"]);
        assert_eq!(stats.authors, vec!["ada"]);
        assert_eq!(stats.last_activity, Some(late.updated_at));
    }

    #[test]
    fn test_aggregate_empty() {
        let stats = NodeMountStats::aggregate(&[], &[]);
        assert_eq!(stats, NodeMountStats::default());
    }

    #[test]
    fn test_graph_totals_skip_idle_nodes() {
        let busy = NodeMountStats {
            work_count: 3,
            total_reuse_count: 10,
            ..Default::default()
        };
        let quiet = NodeMountStats {
            work_count: 1,
            total_reuse_count: 2,
            ..Default::default()
        };
        let idle = NodeMountStats::default();

        let stats = GraphMountStats::from_nodes([&busy, &quiet, &idle]);
        assert_eq!(stats.total_work_count, 4);
        assert_eq!(stats.total_reuse_count, 12);
        assert_eq!(stats.node_count, 2);
        assert!((stats.avg_works_per_node - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_graph_totals_empty() {
        let stats = GraphMountStats::from_nodes(std::iter::empty());
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.avg_works_per_node, 0.0);
    }
}
