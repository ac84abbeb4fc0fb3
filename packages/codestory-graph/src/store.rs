//! [`GraphStore`]: the typed read/write contract every pipeline step
//! programs against, plus an in-memory implementation used for local runs
//! and tests.

use crate::error::{GraphError, Result};
use crate::metrics::GraphMetrics;
use crate::query::{GraphOperation, Record};
use crate::schema::schema_elements;
use async_trait::async_trait;
use codestory_core::domain::{NodeLabel, RelationshipType};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Typed read/write contract over a labeled-property graph.
///
/// Implementations must satisfy: reads never fail on an empty result set;
/// `execute_many` commits or rolls back as one transaction; transient
/// connection failures are retried internally (implementations get this for
/// free by building on [`retry_with_backoff`]); schema initialization is
/// idempotent.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn execute(&self, op: GraphOperation) -> Result<Vec<Record>>;

    /// Executes every operation in one transaction; on any failure none of
    /// the writes are visible.
    async fn execute_many(&self, ops: Vec<GraphOperation>) -> Result<()>;

    async fn semantic_search(
        &self,
        embedding: &[f32],
        label: NodeLabel,
        k: usize,
    ) -> Result<Vec<(Record, f32)>>;

    async fn initialize_schema(&self, force: bool) -> Result<()>;

    async fn verify_schema(&self) -> Result<Vec<(String, bool)>>;

    async fn create_vector_index(
        &self,
        label: NodeLabel,
        property: &str,
        dimensions: u32,
        similarity: &str,
    ) -> Result<()>;

    async fn ping(&self) -> bool;

    async fn close(&self);

    fn metrics(&self) -> &GraphMetrics;
}

/// Retries `f` on [`GraphError::Connection`] with exponential backoff
/// (`base * 2^attempt`), matching the original connector's retry loop.
/// Any other error surfaces immediately without a retry.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    base: Duration,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..attempts {
        match f().await {
            Ok(v) => return Ok(v),
            Err(GraphError::Connection(msg)) => {
                last_err = Some(GraphError::Connection(msg));
                if attempt + 1 < attempts {
                    let backoff = base * 2u32.pow(attempt);
                    debug!(attempt, ?backoff, "retrying after transient graph error");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| GraphError::Connection("retries exhausted".into())))
}

#[derive(Debug, Clone, PartialEq)]
struct StoredNode {
    label: NodeLabel,
    key: String,
    properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    rel_type: RelationshipType,
    from: (NodeLabel, String),
    to: (NodeLabel, String),
}

/// A single-process graph store backed by in-memory maps. Stands in for a
/// real backend (Neo4j, Memgraph) in tests and local runs; the write
/// contract (idempotent MERGE, transactional `execute_many`, retry policy)
/// is identical so steps written against this implementation carry over
/// unchanged.
pub struct InMemoryGraphStore {
    nodes: DashMap<(NodeLabel, String), StoredNode>,
    edges: DashMap<EdgeKey, ()>,
    force_unavailable: std::sync::atomic::AtomicU32,
    metrics: GraphMetrics,
    simulated_elements: DashMap<String, ()>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
            force_unavailable: std::sync::atomic::AtomicU32::new(0),
            metrics: GraphMetrics::new(),
            simulated_elements: DashMap::new(),
        }
    }

    /// Test hook: makes the next `n` calls fail with a transient
    /// [`GraphError::Connection`] before succeeding, to exercise the retry
    /// path.
    pub fn fail_next(&self, n: u32) {
        self.force_unavailable
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        let remaining = self.force_unavailable.load(Ordering::SeqCst);
        if remaining > 0 {
            self.force_unavailable.store(remaining - 1, Ordering::SeqCst);
            return Err(GraphError::Connection("simulated unavailability".into()));
        }
        Ok(())
    }

    fn apply(&self, op: &GraphOperation) -> Result<Vec<Record>> {
        self.maybe_fail()?;
        match op {
            GraphOperation::MergeNode {
                label,
                key_prop,
                key_value,
                properties,
            } => {
                let mut props = properties.clone();
                props.insert((*key_prop).to_string(), Value::String(key_value.clone()));
                self.nodes.insert(
                    (*label, key_value.clone()),
                    StoredNode {
                        label: *label,
                        key: key_value.clone(),
                        properties: props.clone(),
                    },
                );
                Ok(vec![props])
            }
            GraphOperation::MergeRelationship {
                rel_type,
                from_label,
                from_key_value,
                to_label,
                to_key_value,
                ..
            } => {
                if !self.nodes.contains_key(&(*from_label, from_key_value.clone()))
                    || !self.nodes.contains_key(&(*to_label, to_key_value.clone()))
                {
                    return Err(GraphError::Query(
                        "cannot create relationship: endpoint node missing".into(),
                    ));
                }
                self.edges.insert(
                    EdgeKey {
                        rel_type: *rel_type,
                        from: (*from_label, from_key_value.clone()),
                        to: (*to_label, to_key_value.clone()),
                    },
                    (),
                );
                Ok(vec![])
            }
            GraphOperation::CountNodes { label } => {
                let count = self.nodes.iter().filter(|e| e.key().0 == *label).count();
                let mut row = serde_json::Map::new();
                row.insert("count".into(), Value::from(count));
                Ok(vec![row])
            }
            GraphOperation::NodesByLabel { label } => Ok(self
                .nodes
                .iter()
                .filter(|e| e.key().0 == *label)
                .map(|e| e.value().properties.clone())
                .collect()),
            GraphOperation::NodeByKey {
                label, key_value, ..
            } => Ok(self
                .nodes
                .get(&(*label, key_value.clone()))
                .map(|n| vec![n.properties.clone()])
                .unwrap_or_default()),
            GraphOperation::Related {
                label,
                key_value,
                rel_type,
                outgoing,
                ..
            } => {
                let mut out = Vec::new();
                for e in self.edges.iter() {
                    let k = e.key();
                    if k.rel_type != *rel_type {
                        continue;
                    }
                    let (anchor, other) = if *outgoing {
                        (&k.from, &k.to)
                    } else {
                        (&k.to, &k.from)
                    };
                    if anchor.0 == *label && anchor.1 == *key_value {
                        if let Some(node) = self.nodes.get(other) {
                            out.push(node.properties.clone());
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn execute(&self, op: GraphOperation) -> Result<Vec<Record>> {
        let operation_label = op.operation_label();
        let start = Instant::now();
        let result = retry_with_backoff(DEFAULT_RETRY_ATTEMPTS, DEFAULT_BASE_BACKOFF, || {
            let op = op.clone();
            async move { self.apply(&op) }
        })
        .await;
        self.metrics
            .record_query(operation_label, result.is_ok(), start.elapsed());
        result
    }

    async fn execute_many(&self, ops: Vec<GraphOperation>) -> Result<()> {
        let start = Instant::now();
        // Snapshot isolation is unnecessary for an in-process map; we
        // validate every operation before committing any of them so a
        // failure partway through never leaves a partial write, matching
        // the single-transaction contract.
        for op in &ops {
            if let GraphOperation::MergeRelationship {
                from_label,
                from_key_value,
                to_label,
                to_key_value,
                ..
            } = op
            {
                let from_ok = self.nodes.contains_key(&(*from_label, from_key_value.clone()))
                    || ops.iter().any(|o| matches!(o, GraphOperation::MergeNode { label, key_value, .. } if *label == *from_label && key_value == from_key_value));
                let to_ok = self.nodes.contains_key(&(*to_label, to_key_value.clone()))
                    || ops.iter().any(|o| matches!(o, GraphOperation::MergeNode { label, key_value, .. } if *label == *to_label && key_value == to_key_value));
                if !from_ok || !to_ok {
                    self.metrics.record_query("write", false, start.elapsed());
                    return Err(GraphError::Transaction(
                        "relationship endpoint missing from transaction".into(),
                    ));
                }
            }
        }
        for op in ops {
            self.apply(&op)?;
        }
        self.metrics.record_query("write", true, start.elapsed());
        Ok(())
    }

    async fn semantic_search(
        &self,
        embedding: &[f32],
        label: NodeLabel,
        k: usize,
    ) -> Result<Vec<(Record, f32)>> {
        let mut scored: Vec<(Record, f32)> = self
            .nodes
            .iter()
            .filter(|e| e.key().0 == label)
            .filter_map(|e| {
                let props = &e.value().properties;
                let vec = props.get("embedding")?.as_array()?;
                let candidate: Vec<f32> = vec.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect();
                Some((props.clone(), cosine_similarity(embedding, &candidate)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn initialize_schema(&self, force: bool) -> Result<()> {
        if force {
            self.simulated_elements.clear();
        }
        for element in schema_elements() {
            // Idempotent: re-creating an existing element is a no-op, same
            // as the backend-reported "already exists" short-circuit in the
            // original connector.
            self.simulated_elements.insert(element.name().to_string(), ());
        }
        Ok(())
    }

    async fn verify_schema(&self) -> Result<Vec<(String, bool)>> {
        Ok(schema_elements()
            .into_iter()
            .map(|e| {
                let name = e.name().to_string();
                let present = self.simulated_elements.contains_key(&name);
                (name, present)
            })
            .collect())
    }

    async fn create_vector_index(
        &self,
        label: NodeLabel,
        property: &str,
        dimensions: u32,
        similarity: &str,
    ) -> Result<()> {
        let _ = (dimensions, similarity);
        let index_name = format!("{}_{}_embedding", label.as_str().to_lowercase(), property);
        self.simulated_elements.insert(index_name, ());
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.maybe_fail().is_ok()
    }

    async fn close(&self) {
        warn!("closing in-memory graph store");
    }

    fn metrics(&self) -> &GraphMetrics {
        &self.metrics
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn node_op(
    label: NodeLabel,
    key_prop: &'static str,
    key_value: impl Into<String>,
    properties: serde_json::Map<String, Value>,
) -> GraphOperation {
    GraphOperation::MergeNode {
        label,
        key_prop,
        key_value: key_value.into(),
        properties,
    }
}

/// Convenience builder used by steps to MERGE a node keyed by `path`,
/// matching the filesystem and symbol nodes' identity rule.
pub fn merge_by_path(label: NodeLabel, path: impl Into<String>, properties: serde_json::Map<String, Value>) -> GraphOperation {
    node_op(label, "path", path, properties)
}

/// Convenience builder for nodes keyed by `qualified_name` (classes,
/// functions, methods).
pub fn merge_by_qualified_name(
    label: NodeLabel,
    qualified_name: impl Into<String>,
    properties: serde_json::Map<String, Value>,
) -> GraphOperation {
    node_op(label, "qualified_name", qualified_name, properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestory_core::domain::NodeLabel;
    use proptest::prelude::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn merge_node_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let op = merge_by_path(NodeLabel::File, "src/main.rs", props(&[("name", json!("main.rs"))]));
        store.execute(op.clone()).await.unwrap();
        store.execute(op).await.unwrap();
        let count = store.execute(GraphOperation::CountNodes { label: NodeLabel::File }).await.unwrap();
        assert_eq!(count[0]["count"], json!(1));
    }

    #[tokio::test]
    async fn merge_relationship_requires_both_endpoints() {
        let store = InMemoryGraphStore::new();
        let err = store
            .execute(GraphOperation::MergeRelationship {
                rel_type: RelationshipType::Contains,
                from_label: NodeLabel::Directory,
                from_key_prop: "path",
                from_key_value: "src".into(),
                to_label: NodeLabel::File,
                to_key_prop: "path",
                to_key_value: "src/main.rs".into(),
            })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn execute_many_commits_all_or_nothing() {
        let store = InMemoryGraphStore::new();
        let ops = vec![
            merge_by_path(NodeLabel::Directory, "src", props(&[("name", json!("src"))])),
            merge_by_path(NodeLabel::File, "src/main.rs", props(&[("name", json!("main.rs"))])),
            GraphOperation::MergeRelationship {
                rel_type: RelationshipType::Contains,
                from_label: NodeLabel::Directory,
                from_key_prop: "path",
                from_key_value: "src".into(),
                to_label: NodeLabel::File,
                to_key_prop: "path",
                to_key_value: "src/main.rs".into(),
            },
        ];
        store.execute_many(ops).await.unwrap();
        let related = store
            .execute(GraphOperation::Related {
                label: NodeLabel::Directory,
                key_prop: "path",
                key_value: "src".into(),
                rel_type: RelationshipType::Contains,
                outgoing: true,
            })
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
    }

    #[tokio::test]
    async fn execute_many_rolls_back_on_missing_endpoint() {
        let store = InMemoryGraphStore::new();
        let ops = vec![
            merge_by_path(NodeLabel::Directory, "src", props(&[])),
            GraphOperation::MergeRelationship {
                rel_type: RelationshipType::Contains,
                from_label: NodeLabel::Directory,
                from_key_prop: "path",
                from_key_value: "src".into(),
                to_label: NodeLabel::File,
                to_key_prop: "path",
                to_key_value: "ghost.rs".into(),
            },
        ];
        let result = store.execute_many(ops).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let store = InMemoryGraphStore::new();
        store.fail_next(2);
        let op = merge_by_path(NodeLabel::File, "a.rs", props(&[]));
        store.execute(op).await.unwrap();
        assert_eq!(store.metrics().success_count("write"), 1);
    }

    #[tokio::test]
    async fn schema_initialization_is_idempotent() {
        let store = InMemoryGraphStore::new();
        store.initialize_schema(false).await.unwrap();
        store.initialize_schema(false).await.unwrap();
        let verified = store.verify_schema().await.unwrap();
        assert!(verified.iter().all(|(_, present)| *present));
        assert_eq!(verified.len(), schema_elements().len());
    }

    #[tokio::test]
    async fn semantic_search_ranks_by_cosine_similarity() {
        let store = InMemoryGraphStore::new();
        store
            .execute(merge_by_path(
                NodeLabel::Summary,
                "s1",
                props(&[("embedding", json!([1.0, 0.0]))]),
            ))
            .await
            .unwrap();
        store
            .execute(merge_by_path(
                NodeLabel::Summary,
                "s2",
                props(&[("embedding", json!([0.0, 1.0]))]),
            ))
            .await
            .unwrap();
        let results = store
            .semantic_search(&[1.0, 0.0], NodeLabel::Summary, 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1 > 0.9);
    }

    proptest! {
        /// MERGE is a last-write-wins upsert: no matter how many times the
        /// same key is merged with different property sets, the store ends
        /// up holding exactly one node carrying the final merge's
        /// properties, never a duplicate and never a stale value.
        #[test]
        fn repeated_merges_of_the_same_key_never_duplicate_and_always_land_on_the_last_write(
            names in proptest::collection::vec("[a-z]{1,8}", 1..12),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let last = names.last().cloned().unwrap();
            rt.block_on(async {
                let store = InMemoryGraphStore::new();
                for name in &names {
                    store
                        .execute(merge_by_path(NodeLabel::File, "src/same.rs", props(&[("name", json!(name))])))
                        .await
                        .unwrap();
                }
                let count = store.execute(GraphOperation::CountNodes { label: NodeLabel::File }).await.unwrap();
                prop_assert_eq!(count[0]["count"], json!(1));
                let node = store
                    .execute(GraphOperation::NodeByKey { label: NodeLabel::File, key_prop: "path", key_value: "src/same.rs".into() })
                    .await
                    .unwrap();
                prop_assert_eq!(node[0]["name"].clone(), json!(last));
                Ok(())
            })?;
        }
    }
}
