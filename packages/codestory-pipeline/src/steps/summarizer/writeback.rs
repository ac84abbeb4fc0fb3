//! Writeback (spec 4.7.5): on a successful summary, create a `Summary` node,
//! link it to its source with `HAS_SUMMARY`, and leave a local JSON audit
//! copy under `<repo>/.summaries/`.

use std::path::Path;

use codestory_core::domain::{NodeLabel, RelationshipType, SummaryNode};
use codestory_graph::{GraphOperation, GraphStore, Result as GraphResult};
use serde_json::{json, Map};

use super::dag::key_prop_for;

pub async fn write_summary(
    graph: &dyn GraphStore,
    repo_root: &Path,
    source_label: NodeLabel,
    source_key: &str,
    text: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
) -> GraphResult<SummaryNode> {
    let summary = SummaryNode::new(text, source_label.as_str());

    let mut properties = Map::new();
    properties.insert("text".into(), json!(summary.text));
    properties.insert("created_at".into(), json!(summary.created_at.to_rfc3339()));
    properties.insert("source_type".into(), json!(summary.source_type));

    graph
        .execute(GraphOperation::MergeNode {
            label: NodeLabel::Summary,
            key_prop: "id",
            key_value: summary.id.to_string(),
            properties,
        })
        .await?;

    graph
        .execute(GraphOperation::MergeRelationship {
            rel_type: RelationshipType::HasSummary,
            from_label: source_label,
            from_key_prop: key_prop_for(source_label),
            from_key_value: source_key.to_string(),
            to_label: NodeLabel::Summary,
            to_key_prop: "id",
            to_key_value: summary.id.to_string(),
        })
        .await?;

    write_audit_dump(repo_root, source_label, source_key, &summary, prompt_tokens, completion_tokens);
    Ok(summary)
}

fn write_audit_dump(repo_root: &Path, source_label: NodeLabel, source_key: &str, summary: &SummaryNode, prompt_tokens: u64, completion_tokens: u64) {
    let dir = repo_root.join(".summaries");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let dump = json!({
        "node_id": summary.id.to_string(),
        "source_label": source_label.as_str(),
        "source_key": source_key,
        "text": summary.text,
        "prompt_tokens": prompt_tokens,
        "completion_tokens": completion_tokens,
    });
    let path = dir.join(format!("{}.json", summary.id));
    if let Ok(serialized) = serde_json::to_string_pretty(&dump) {
        let _ = std::fs::write(path, serialized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestory_graph::{merge_by_path, InMemoryGraphStore};

    #[tokio::test]
    async fn writeback_links_summary_to_source_and_dumps_audit_file() {
        let store = InMemoryGraphStore::new();
        store.execute(merge_by_path(NodeLabel::File, "src/a.py", Map::new())).await.unwrap();
        let dir = tempfile::TempDir::new().unwrap();

        let summary = write_summary(&store, dir.path(), NodeLabel::File, "src/a.py", "it does things", 10, 20)
            .await
            .unwrap();

        let related = store
            .execute(GraphOperation::Related {
                label: NodeLabel::File,
                key_prop: "path",
                key_value: "src/a.py".to_string(),
                rel_type: RelationshipType::HasSummary,
                outgoing: true,
            })
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0]["text"], json!("it does things"));

        let dump_path = dir.path().join(".summaries").join(format!("{}.json", summary.id));
        assert!(dump_path.exists());
    }
}
