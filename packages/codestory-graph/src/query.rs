//! A small structured query representation standing in for the adapter's
//! Cypher surface.
//!
//! The spec describes the adapter's contract in terms of a Cypher-like
//! `execute(query, params, write)` call. Rather than hand-roll a Cypher
//! parser for an in-memory backend that will never see a real one, every
//! call site in this workspace builds one of these typed operations and
//! hands it to [`crate::store::GraphStore::execute`]. A production backend
//! (Neo4j, Memgraph, ...) renders each variant to the query text it needs;
//! the in-memory backend interprets it directly.

use codestory_core::domain::{NodeLabel, RelationshipType};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub enum GraphOperation {
    /// `MERGE (n:Label {key_prop: key_value}) SET n += properties`
    MergeNode {
        label: NodeLabel,
        key_prop: &'static str,
        key_value: String,
        properties: Map<String, Value>,
    },
    /// `MATCH (a), (b) MERGE (a)-[:REL]->(b)`
    MergeRelationship {
        rel_type: RelationshipType,
        from_label: NodeLabel,
        from_key_prop: &'static str,
        from_key_value: String,
        to_label: NodeLabel,
        to_key_prop: &'static str,
        to_key_value: String,
    },
    CountNodes {
        label: NodeLabel,
    },
    NodesByLabel {
        label: NodeLabel,
    },
    NodeByKey {
        label: NodeLabel,
        key_prop: &'static str,
        key_value: String,
    },
    /// Nodes reachable by one `rel_type` hop from (label, key_value), in the
    /// given direction.
    Related {
        label: NodeLabel,
        key_prop: &'static str,
        key_value: String,
        rel_type: RelationshipType,
        outgoing: bool,
    },
}

impl GraphOperation {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            GraphOperation::MergeNode { .. } | GraphOperation::MergeRelationship { .. }
        )
    }

    pub fn operation_label(&self) -> &'static str {
        if self.is_write() {
            "write"
        } else {
            "read"
        }
    }
}

/// One result row: a name -> value mapping, matching the spec's description
/// of read results.
pub type Record = Map<String, Value>;
