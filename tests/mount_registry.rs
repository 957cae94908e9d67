//! Integration tests for mounting content onto graph nodes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use knowledge_graph_kernel::store::{GraphRepository, MountStore};
use knowledge_graph_kernel::{
    ContentRecord, GraphError, GraphNode, InMemoryContentLookup, InMemoryError,
    InMemoryGraphRepository, InMemoryMountStore, KnowledgeGraph, MountError, MountOptions,
    MountRegistry, MountType, NodeType, NodeUpdate, WorkMount,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Graph repository whose saves can be made to fail on demand.
#[derive(Default)]
struct FlakyGraphs {
    inner: InMemoryGraphRepository,
    fail_saves: AtomicBool,
}

#[async_trait]
impl GraphRepository for FlakyGraphs {
    type Error = InMemoryError;

    async fn load(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>, Self::Error> {
        self.inner.load(graph_id).await
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<(), Self::Error> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(InMemoryError::VersionConflict {
                graph_id: graph.id.clone(),
                expected: expected_version,
                found: expected_version + 1,
            });
        }
        self.inner.save(graph, expected_version).await
    }
}

/// Mount store whose triple lookup always misses, as when a concurrent
/// mount lands between the lookup and the insert.
#[derive(Default)]
struct RacingMounts {
    inner: InMemoryMountStore,
}

#[async_trait]
impl MountStore for RacingMounts {
    type Error = InMemoryError;

    async fn insert(&self, mount: WorkMount) -> Result<(), Self::Error> {
        self.inner.insert(mount).await
    }

    async fn update(&self, mount: WorkMount) -> Result<(), Self::Error> {
        self.inner.update(mount).await
    }

    async fn remove(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error> {
        self.inner.remove(mount_id).await
    }

    async fn get(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error> {
        self.inner.get(mount_id).await
    }

    async fn find(&self, _: &str, _: &str, _: &str) -> Result<Option<WorkMount>, Self::Error> {
        Ok(None)
    }

    async fn list_by_node(&self, graph_id: &str, node_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.inner.list_by_node(graph_id, node_id).await
    }

    async fn list_by_graph(&self, graph_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.inner.list_by_graph(graph_id).await
    }

    async fn list_by_content(&self, content_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.inner.list_by_content(content_id).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.inner.list_by_owner(owner_id).await
    }

    async fn rebind_node(
        &self,
        graph_id: &str,
        old_node_id: &str,
        new_node_id: &str,
    ) -> Result<usize, Self::Error> {
        self.inner.rebind_node(graph_id, old_node_id, new_node_id).await
    }

    fn is_duplicate_mount(error: &Self::Error) -> bool {
        InMemoryMountStore::is_duplicate_mount(error)
    }
}

struct Fixture {
    registry: MountRegistry<FlakyGraphs, InMemoryMountStore, InMemoryContentLookup>,
    graphs: Arc<FlakyGraphs>,
    mounts: Arc<InMemoryMountStore>,
}

fn math_graph(id: &str, owner: &str) -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new(id, owner, "Math");
    graph.add_node(GraphNode::new("n1", "Fractions", NodeType::Concept, 0)).unwrap();
    graph.add_node(GraphNode::new("n2", "Decimals", NodeType::Concept, 0)).unwrap();
    graph.add_node(GraphNode::new("n3", "Percent", NodeType::Concept, 0)).unwrap();
    graph
}

fn content(id: &str, reuse: u64, subject: &str, grade: &str, author: &str) -> ContentRecord {
    ContentRecord {
        id: id.into(),
        reuse_count: reuse,
        subject: Some(subject.into()),
        grade_level: Some(grade.into()),
        author: Some(author.into()),
    }
}

fn fixture() -> Fixture {
    init_tracing();

    let graphs = Arc::new(FlakyGraphs::default());
    graphs.inner.insert(math_graph("g1", "alice"));
    graphs.inner.insert(math_graph("g2", "bob"));

    let lookup = Arc::new(InMemoryContentLookup::new());
    lookup.add_content(content("c1", 3, "math", "5", "ada"));
    lookup.add_content(content("c2", 7, "math", "6", "grace"));
    lookup.add_content(content("c3", 1, "physics", "6", "ada"));

    let mounts = Arc::new(InMemoryMountStore::new());
    let registry = MountRegistry::new(graphs.clone(), mounts.clone(), lookup);
    Fixture {
        registry,
        graphs,
        mounts,
    }
}

async fn node_counters(graphs: &FlakyGraphs, graph_id: &str, node_id: &str) -> (u64, u64) {
    let graph = graphs.load(graph_id).await.unwrap().unwrap();
    let node = graph.get_node(node_id).unwrap();
    (node.metadata.work_count, node.metadata.reuse_count)
}

// ─────────────────────────────────────────────────────────────────────────────
// Mount / Unmount
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_mount_rejected() {
    let f = fixture();
    f.registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();

    let err = f
        .registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::DuplicateMount { .. }));

    f.registry
        .mount("c1", "g1", "n2", "alice", MountOptions::default())
        .await
        .unwrap();
    assert_eq!(f.mounts.len(), 2);
    assert!(f.registry.is_work_mounted("c1", "g1", "n2").await.unwrap());
    assert!(!f.registry.is_work_mounted("c1", "g1", "n3").await.unwrap());
}

#[tokio::test]
async fn test_mount_rejects_foreign_owner() {
    let f = fixture();
    let err = f
        .registry
        .mount("c1", "g2", "n1", "alice", MountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::PermissionDenied { .. }));
    assert!(f.mounts.is_empty());
}

#[tokio::test]
async fn test_mount_missing_graph_and_node() {
    let f = fixture();
    let err = f
        .registry
        .mount("c1", "nope", "n1", "alice", MountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::GraphNotFound(ref id) if id == "nope"));

    let err = f
        .registry
        .mount("c1", "g1", "n9", "alice", MountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::NodeNotFound { .. }));
}

#[tokio::test]
async fn test_counters_follow_mounts() {
    let f = fixture();
    f.registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();
    let second = f
        .registry
        .mount("c2", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();
    assert_eq!(node_counters(&f.graphs, "g1", "n1").await, (2, 10));

    f.registry.unmount(&second.id).await.unwrap();
    assert_eq!(node_counters(&f.graphs, "g1", "n1").await, (1, 3));
    assert_eq!(f.mounts.len(), 1);
}

#[tokio::test]
async fn test_failed_save_rolls_back_mount() {
    let f = fixture();
    f.graphs.fail_saves.store(true, Ordering::SeqCst);

    let err = f
        .registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::Store(_)));
    assert!(f.mounts.is_empty());
    assert!(!f.registry.is_work_mounted("c1", "g1", "n1").await.unwrap());
    assert_eq!(node_counters(&f.graphs, "g1", "n1").await, (0, 0));
}

#[tokio::test]
async fn test_failed_save_restores_unmounted_record() {
    let f = fixture();
    let mount = f
        .registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();

    f.graphs.fail_saves.store(true, Ordering::SeqCst);
    let err = f.registry.unmount(&mount.id).await.unwrap_err();
    assert!(matches!(err, MountError::Store(_)));

    assert!(f.mounts.get(&mount.id).await.unwrap().is_some());
    assert_eq!(node_counters(&f.graphs, "g1", "n1").await, (1, 3));
}

#[tokio::test]
async fn test_unmount_after_node_removed() {
    let f = fixture();
    let mount = f
        .registry
        .mount("c1", "g1", "n3", "alice", MountOptions::default())
        .await
        .unwrap();

    let mut graph = f.graphs.load("g1").await.unwrap().unwrap();
    let expected = graph.version();
    graph.remove_node("n3").unwrap();
    f.graphs.save(&graph, expected).await.unwrap();

    let removed = f.registry.unmount(&mount.id).await.unwrap();
    assert_eq!(removed.id, mount.id);
    assert!(f.mounts.is_empty());
}

#[tokio::test]
async fn test_concurrent_duplicate_reported_as_duplicate() {
    init_tracing();
    let graphs = Arc::new(InMemoryGraphRepository::new());
    graphs.insert(math_graph("g1", "alice"));
    let lookup = Arc::new(InMemoryContentLookup::new());
    lookup.add_content(content("c1", 3, "math", "5", "ada"));
    let mounts = Arc::new(RacingMounts::default());
    let registry = MountRegistry::new(graphs.clone(), mounts.clone(), lookup);

    registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();
    let err = registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MountError::DuplicateMount { ref content_id, .. } if content_id == "c1"));
    assert_eq!(mounts.inner.len(), 1);
    let graph = graphs.load("g1").await.unwrap().unwrap();
    assert_eq!(graph.get_node("n1").unwrap().metadata.work_count, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Renaming
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rename_carries_mounts_to_new_id() {
    let f = fixture();
    let mount = f
        .registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();

    f.registry.rename_node("g1", "n1", "n1x", "alice").await.unwrap();
    assert_eq!(node_counters(&f.graphs, "g1", "n1x").await, (1, 3));
    assert_eq!(f.registry.get_graph_stats("g1").await.unwrap().total_work_count, 1);
    assert!(f.registry.is_work_mounted("c1", "g1", "n1x").await.unwrap());

    let removed = f.registry.unmount(&mount.id).await.unwrap();
    assert_eq!(removed.node_id, "n1x");
    assert_eq!(node_counters(&f.graphs, "g1", "n1x").await, (0, 0));
}

#[tokio::test]
async fn test_plain_update_cannot_rename_mounted_node() {
    let f = fixture();
    f.registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();

    let mut graph = f.graphs.load("g1").await.unwrap().unwrap();
    let err = graph
        .update_node(
            "n1",
            NodeUpdate {
                id: Some("n1x".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err, GraphError::MountedNode("n1".into()));
    assert!(graph.get_node("n1").is_some());
}

#[tokio::test]
async fn test_failed_rename_save_restores_mounts() {
    let f = fixture();
    f.registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();

    f.graphs.fail_saves.store(true, Ordering::SeqCst);
    let err = f
        .registry
        .rename_node("g1", "n1", "n1x", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::Store(_)));

    assert!(f.registry.is_work_mounted("c1", "g1", "n1").await.unwrap());
    assert!(f.registry.list_by_node("g1", "n1x").await.unwrap().is_empty());
    assert_eq!(node_counters(&f.graphs, "g1", "n1").await, (1, 3));
}

#[tokio::test]
async fn test_rename_onto_existing_node_rejected() {
    let f = fixture();
    f.registry
        .mount("c1", "g1", "n1", "alice", MountOptions::default())
        .await
        .unwrap();

    let err = f
        .registry
        .rename_node("g1", "n1", "n2", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::Graph(GraphError::DuplicateId(_))));
    assert_eq!(f.registry.list_by_node("g1", "n1").await.unwrap().len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Primary Mounts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_primary_demotes_previous() {
    let f = fixture();
    let first = f
        .registry
        .mount(
            "c1",
            "g1",
            "n1",
            "alice",
            MountOptions {
                is_primary: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let second = f
        .registry
        .mount("c1", "g1", "n2", "alice", MountOptions::default())
        .await
        .unwrap();
    assert!(first.is_primary);
    assert!(!second.is_primary);

    f.registry.set_primary(&second.id).await.unwrap();

    let first = f.mounts.get(&first.id).await.unwrap().unwrap();
    let second = f.mounts.get(&second.id).await.unwrap().unwrap();
    assert!(!first.is_primary);
    assert!(second.is_primary);
    let primaries = f
        .registry
        .list_by_content("c1")
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.is_primary)
        .count();
    assert_eq!(primaries, 1);
}

#[tokio::test]
async fn test_set_primary_missing_mount() {
    let f = fixture();
    let err = f.registry.set_primary("ghost").await.unwrap_err();
    assert!(matches!(err, MountError::MountNotFound(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats and Listings
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_node_stats() {
    let f = fixture();
    for id in ["c1", "c2", "c3"] {
        f.registry
            .mount(id, "g1", "n1", "alice", MountOptions::default())
            .await
            .unwrap();
    }

    let stats = f.registry.get_node_stats("g1", "n1").await.unwrap();
    assert_eq!(stats.work_count, 3);
    assert_eq!(stats.total_reuse_count, 11);
    assert_eq!(stats.subjects, vec!["math", "physics"]);
    assert_eq!(stats.grade_levels, vec!["5", "6"]);
    assert_eq!(stats.authors, vec!["ada", "grace"]);
    assert!(stats.last_activity.is_some());

    let empty = f.registry.get_node_stats("g1", "n2").await.unwrap();
    assert_eq!(empty.work_count, 0);
    assert!(empty.last_activity.is_none());
}

#[tokio::test]
async fn test_graph_stats() {
    let f = fixture();
    f.registry.mount("c1", "g1", "n1", "alice", MountOptions::default()).await.unwrap();
    f.registry.mount("c2", "g1", "n1", "alice", MountOptions::default()).await.unwrap();
    f.registry.mount("c1", "g1", "n2", "alice", MountOptions::default()).await.unwrap();

    let stats = f.registry.get_graph_stats("g1").await.unwrap();
    assert_eq!(stats.total_work_count, 3);
    assert_eq!(stats.total_reuse_count, 13);
    assert_eq!(stats.node_count, 2);
    assert!((stats.avg_works_per_node - 1.5).abs() < f64::EPSILON);

    let err = f.registry.get_graph_stats("nope").await.unwrap_err();
    assert!(matches!(err, MountError::GraphNotFound(_)));
}

#[tokio::test]
async fn test_listings_are_ordered() {
    let f = fixture();
    let options = |position, mount_type| MountOptions {
        position,
        mount_type,
        ..Default::default()
    };
    f.registry
        .mount("c2", "g1", "n1", "alice", options(2, MountType::Recommendation))
        .await
        .unwrap();
    f.registry
        .mount("c1", "g1", "n1", "alice", options(1, MountType::Manual))
        .await
        .unwrap();
    f.registry
        .mount("c3", "g2", "n1", "bob", options(0, MountType::System))
        .await
        .unwrap();

    let at_node: Vec<_> = f
        .registry
        .list_by_node("g1", "n1")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content_id)
        .collect();
    assert_eq!(at_node, vec!["c1", "c2"]);

    let bobs = f.registry.list_by_owner("bob").await.unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].mount_type, MountType::System);
}
