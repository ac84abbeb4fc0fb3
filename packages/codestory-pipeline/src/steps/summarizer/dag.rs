//! Dependency graph construction (spec 4.7.1): loads the repository's
//! structural and semantic edges from the graph store and turns them into a
//! "must be summarized before" DAG, breaking any cycles deterministically.

use codestory_core::domain::NodeLabel;
use codestory_graph::{GraphOperation, GraphStore, Record};
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub type NodeKey = (NodeLabel, String);

/// Structural container labels: every node under one of these may have
/// `CONTAINS` children that must be summarized before it.
const CONTAINER_LABELS: [NodeLabel; 4] = [
    NodeLabel::Repository,
    NodeLabel::Directory,
    NodeLabel::File,
    NodeLabel::Class,
];

#[derive(Debug, Clone)]
pub struct SummarizerNode {
    pub key: NodeKey,
    pub properties: Record,
}

/// The derived "must be summarized before" DAG: `depends_on[n]` is the set
/// of nodes that must complete (successfully or not) before `n` is
/// dispatched; `dependents[n]` is its inverse, used to re-check readiness as
/// nodes finish.
#[derive(Debug, Default)]
pub struct SummarizerDag {
    pub nodes: HashMap<NodeKey, SummarizerNode>,
    pub depends_on: HashMap<NodeKey, HashSet<NodeKey>>,
    pub dependents: HashMap<NodeKey, HashSet<NodeKey>>,
}

impl SummarizerDag {
    /// Loads every directory/file/class/function/method/module node plus the
    /// repository root, derives structural-containment, import, and
    /// inheritance edges, and breaks any cycles before returning.
    pub async fn build(graph: &dyn GraphStore, repo_path: &str) -> codestory_graph::Result<Self> {
        let mut dag = SummarizerDag::default();
        let mut key_to_label: HashMap<String, NodeLabel> = HashMap::new();

        let repo_rows = graph
            .execute(GraphOperation::NodeByKey {
                label: NodeLabel::Repository,
                key_prop: "path",
                key_value: repo_path.to_string(),
            })
            .await?;
        for row in repo_rows {
            dag.insert_node(NodeLabel::Repository, repo_path.to_string(), row, &mut key_to_label);
        }

        const LOADABLE: [NodeLabel; 6] = [
            NodeLabel::Directory,
            NodeLabel::File,
            NodeLabel::Class,
            NodeLabel::Function,
            NodeLabel::Method,
            NodeLabel::Module,
        ];
        for label in LOADABLE {
            let rows = graph.execute(GraphOperation::NodesByLabel { label }).await?;
            for row in rows {
                if let Some(key) = node_key(&row) {
                    dag.insert_node(label, key, row, &mut key_to_label);
                }
            }
        }

        for label in CONTAINER_LABELS {
            let parent_keys: Vec<String> = dag
                .nodes
                .keys()
                .filter(|(l, _)| *l == label)
                .map(|(_, k)| k.clone())
                .collect();
            for parent_key in parent_keys {
                let children = graph
                    .execute(GraphOperation::Related {
                        label,
                        key_prop: key_prop_for(label),
                        key_value: parent_key.clone(),
                        rel_type: codestory_core::domain::RelationshipType::Contains,
                        outgoing: true,
                    })
                    .await?;
                for child_row in children {
                    if let Some(child_key) = node_key(&child_row) {
                        if let Some(child_label) = key_to_label.get(&child_key).copied() {
                            // Structural edges run child-before-parent: the
                            // parent's summary needs its children's.
                            dag.add_dependency((label, parent_key.clone()), (child_label, child_key));
                        }
                    }
                }
            }
        }

        let file_keys: Vec<String> = dag.nodes.keys().filter(|(l, _)| *l == NodeLabel::File).map(|(_, k)| k.clone()).collect();
        for file_key in file_keys {
            let imported = graph
                .execute(GraphOperation::Related {
                    label: NodeLabel::File,
                    key_prop: "path",
                    key_value: file_key.clone(),
                    rel_type: codestory_core::domain::RelationshipType::Imports,
                    outgoing: true,
                })
                .await?;
            for row in imported {
                if let Some(key) = node_key(&row) {
                    if key_to_label.get(&key) == Some(&NodeLabel::File) {
                        dag.add_dependency((NodeLabel::File, file_key.clone()), (NodeLabel::File, key));
                    }
                }
            }
        }

        let class_keys: Vec<String> = dag.nodes.keys().filter(|(l, _)| *l == NodeLabel::Class).map(|(_, k)| k.clone()).collect();
        for class_key in class_keys {
            let parents = graph
                .execute(GraphOperation::Related {
                    label: NodeLabel::Class,
                    key_prop: "qualified_name",
                    key_value: class_key.clone(),
                    rel_type: codestory_core::domain::RelationshipType::InheritsFrom,
                    outgoing: true,
                })
                .await?;
            for row in parents {
                if let Some(key) = node_key(&row) {
                    if key_to_label.get(&key) == Some(&NodeLabel::Class) {
                        dag.add_dependency((NodeLabel::Class, class_key.clone()), (NodeLabel::Class, key));
                    }
                }
            }
        }

        dag.break_cycles();
        Ok(dag)
    }

    fn insert_node(&mut self, label: NodeLabel, key: String, properties: Record, key_to_label: &mut HashMap<String, NodeLabel>) {
        key_to_label.insert(key.clone(), label);
        self.nodes.insert((label, key.clone()), SummarizerNode { key: (label, key), properties });
    }

    fn add_dependency(&mut self, node: NodeKey, prerequisite: NodeKey) {
        if node == prerequisite {
            return;
        }
        self.depends_on.entry(node.clone()).or_default().insert(prerequisite.clone());
        self.dependents.entry(prerequisite).or_default().insert(node);
    }

    /// Detects cycles via repeated DFS and drops the offending edge with the
    /// highest `(source kind priority, qualified_name)` tuple until the
    /// graph is acyclic, logging every drop (spec 4.7.1).
    fn break_cycles(&mut self) {
        loop {
            let back_edges = self.find_back_edges();
            if back_edges.is_empty() {
                break;
            }
            let dropped = back_edges
                .into_iter()
                .max_by(|a, b| cycle_break_key(a).cmp(&cycle_break_key(b)))
                .unwrap();
            warn!(?dropped, "breaking summarizer dependency cycle");
            if let Some(set) = self.depends_on.get_mut(&dropped.0) {
                set.remove(&dropped.1);
            }
            if let Some(set) = self.dependents.get_mut(&dropped.1) {
                set.remove(&dropped.0);
            }
        }
    }

    fn find_back_edges(&self) -> Vec<(NodeKey, NodeKey)> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color: HashMap<NodeKey, Color> = self.nodes.keys().map(|k| (k.clone(), Color::White)).collect();
        let mut back_edges = Vec::new();

        fn visit(
            node: &NodeKey,
            depends_on: &HashMap<NodeKey, HashSet<NodeKey>>,
            color: &mut HashMap<NodeKey, Color>,
            back_edges: &mut Vec<(NodeKey, NodeKey)>,
        ) {
            color.insert(node.clone(), Color::Gray);
            if let Some(deps) = depends_on.get(node) {
                for dep in deps {
                    match color.get(dep).copied().unwrap_or(Color::White) {
                        Color::White => visit(dep, depends_on, color, back_edges),
                        Color::Gray => back_edges.push((node.clone(), dep.clone())),
                        Color::Black => {}
                    }
                }
            }
            color.insert(node.clone(), Color::Black);
        }

        for node in self.nodes.keys() {
            if color.get(node).copied().unwrap_or(Color::White) == Color::White {
                visit(node, &self.depends_on, &mut color, &mut back_edges);
            }
        }
        back_edges
    }
}

fn cycle_break_key(edge: &(NodeKey, NodeKey)) -> (u8, String) {
    let ((label, key), _) = edge;
    (label.cycle_priority(), key.clone())
}

pub(crate) fn key_prop_for(label: NodeLabel) -> &'static str {
    match label {
        NodeLabel::Repository | NodeLabel::Directory | NodeLabel::File => "path",
        _ => "qualified_name",
    }
}

fn node_key(row: &Record) -> Option<String> {
    row.get("path")
        .or_else(|| row.get("qualified_name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
