//! Summarizer Step (C7): the bottom-up, LLM-driven summary pass. Split into
//! a dependency graph (`dag`), a bounded-concurrency scheduler (`executor`),
//! content extraction (`content`), prompt building (`prompt`), and
//! write-back (`writeback`); this module wires them into a [`Step`].

pub mod content;
pub mod dag;
pub mod executor;
pub mod prompt;
pub mod writeback;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use codestory_core::domain::{NodeLabel, RelationshipType};
use codestory_graph::{GraphOperation, GraphStore, Record};
use codestory_llm::{chat_with_retry, ChatModel};
use codestory_queue::{TaskHandle, TaskQueue};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde_json::{json, Map};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::progress::ProgressTracker;
use crate::step::{reject_unknown_params, Step, StepContext, StepOutcome};

use content::{extract_class, extract_directory, extract_file, extract_function, extract_repository, ContentCache};
use dag::{NodeKey, SummarizerDag};

const ALLOWED_PARAMS: &[&str] = &["max_concurrency", "max_tokens_per_file", "timeout", "incremental", "ignore_patterns", "job_id"];
const DEFAULT_MAX_CONCURRENCY: usize = 5;
const DEFAULT_MAX_TOKENS_PER_FILE: usize = 8000;

pub struct SummarizerStep {
    chat_model: Arc<dyn ChatModel>,
    model_name: String,
}

impl SummarizerStep {
    pub fn new(chat_model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            chat_model,
            model_name: model_name.into(),
        }
    }
}

fn filter_ignored(dag: &mut SummarizerDag, matcher: &Gitignore) {
    let removed: Vec<NodeKey> = dag
        .nodes
        .keys()
        .filter(|(label, key)| {
            matches!(label, NodeLabel::File | NodeLabel::Directory) && matcher.matched(key, *label == NodeLabel::Directory).is_ignore()
        })
        .cloned()
        .collect();
    for key in &removed {
        dag.nodes.remove(key);
        if let Some(prerequisites) = dag.depends_on.remove(key) {
            for prerequisite in prerequisites {
                if let Some(set) = dag.dependents.get_mut(&prerequisite) {
                    set.remove(key);
                }
            }
        }
        if let Some(dependents) = dag.dependents.remove(key) {
            for dependent in dependents {
                if let Some(set) = dag.depends_on.get_mut(&dependent) {
                    set.remove(key);
                }
            }
        }
    }
}

async fn related_one_hop(graph: &dyn GraphStore, label: NodeLabel, key_prop: &'static str, key_value: &str, rel_type: RelationshipType, outgoing: bool) -> Vec<Record> {
    graph
        .execute(GraphOperation::Related {
            label,
            key_prop,
            key_value: key_value.to_string(),
            rel_type,
            outgoing,
        })
        .await
        .unwrap_or_default()
}

fn record_str<'a>(row: &'a Record, key: &str) -> Option<&'a str> {
    row.get(key).and_then(|v| v.as_str())
}

/// Resolves the containing file's source for a Class/Function/Method by
/// walking `CONTAINS` upward (Method -> Class -> File, or Function -> File
/// directly) until a node carrying a `path` property is reached.
async fn containing_file_content(graph: &dyn GraphStore, label: NodeLabel, key_prop: &'static str, key_value: &str, repo_root: &Path, cache: &ContentCache) -> Option<String> {
    let mut current_label = label;
    let mut current_key_prop = key_prop;
    let mut current_key = key_value.to_string();

    for _ in 0..5 {
        let parents = related_one_hop(graph, current_label, current_key_prop, &current_key, RelationshipType::Contains, false).await;
        let Some(parent) = parents.into_iter().next() else { return None };
        if let Some(path) = record_str(&parent, "path") {
            // A File carries both `path` and `name`+`size`; a Directory
            // carries `path` too but has no source to read.
            if parent.contains_key("size") {
                return cache.read(&repo_root.join(path)).ok().map(|t| t.to_string());
            }
            return None;
        }
        let Some(qualified_name) = record_str(&parent, "qualified_name") else { return None };
        current_key = qualified_name.to_string();
        current_label = NodeLabel::Class;
        current_key_prop = "qualified_name";
    }
    None
}

async fn process_node(
    graph: &Arc<dyn GraphStore>,
    chat_model: &Arc<dyn ChatModel>,
    model_name: &str,
    repo_root: &Path,
    max_tokens_per_file: usize,
    cache: &ContentCache,
    node: &dag::SummarizerNode,
) -> bool {
    let (label, key) = node.key.clone();
    let key_prop = dag::key_prop_for(label);

    let content = match label {
        NodeLabel::Repository => {
            let children = related_one_hop(graph.as_ref(), label, key_prop, &key, RelationshipType::Contains, true).await;
            let directory_names: Vec<String> = children
                .iter()
                .filter(|row| !row.contains_key("size"))
                .filter_map(|row| record_str(row, "name").map(str::to_string))
                .collect();
            let directory_count = graph
                .execute(GraphOperation::CountNodes { label: NodeLabel::Directory })
                .await
                .ok()
                .and_then(|rows| rows.first().and_then(|r| r.get("count")).and_then(|v| v.as_u64()))
                .unwrap_or(0) as usize;
            let file_count = graph
                .execute(GraphOperation::CountNodes { label: NodeLabel::File })
                .await
                .ok()
                .and_then(|rows| rows.first().and_then(|r| r.get("count")).and_then(|v| v.as_u64()))
                .unwrap_or(0) as usize;
            extract_repository(repo_root, &directory_names, directory_count, file_count, cache)
        }
        NodeLabel::Directory => {
            let children = related_one_hop(graph.as_ref(), label, key_prop, &key, RelationshipType::Contains, true).await;
            let child_names: Vec<String> = children.iter().filter_map(|row| record_str(row, "name").map(str::to_string)).collect();
            let mut child_summaries = Vec::new();
            for row in &children {
                let Some(child_path) = record_str(row, "path") else { continue };
                let child_label = if row.contains_key("size") { NodeLabel::File } else { NodeLabel::Directory };
                let summaries = related_one_hop(graph.as_ref(), child_label, dag::key_prop_for(child_label), child_path, RelationshipType::HasSummary, true).await;
                if let Some(summary) = summaries.first() {
                    if let Some(text) = record_str(summary, "text") {
                        child_summaries.push((child_label.as_str().to_string(), text.to_string()));
                    }
                }
            }
            extract_directory(&child_names, &child_summaries)
        }
        NodeLabel::File => {
            let extension = node.properties.get("extension").and_then(|v| v.as_str()).map(str::to_string);
            extract_file(repo_root, &key, extension.as_deref(), max_tokens_per_file, cache)
        }
        NodeLabel::Class => {
            let file_content = containing_file_content(graph.as_ref(), label, key_prop, &key, repo_root, cache).await.unwrap_or_default();
            let parents = related_one_hop(graph.as_ref(), label, key_prop, &key, RelationshipType::InheritsFrom, true).await;
            let parent_names: Vec<String> = parents.iter().filter_map(|row| record_str(row, "name").map(str::to_string)).collect();
            let methods = related_one_hop(graph.as_ref(), label, key_prop, &key, RelationshipType::Contains, true).await;
            let method_names: Vec<String> = methods.iter().filter_map(|row| record_str(row, "name").map(str::to_string)).collect();
            let class_name = node.properties.get("name").and_then(|v| v.as_str()).unwrap_or(&key);
            extract_class(&file_content, class_name, &parent_names, &method_names)
        }
        NodeLabel::Function | NodeLabel::Method => {
            let file_content = containing_file_content(graph.as_ref(), label, key_prop, &key, repo_root, cache).await.unwrap_or_default();
            let is_method = label == NodeLabel::Method;
            let name = node.properties.get("name").and_then(|v| v.as_str()).unwrap_or(&key);
            extract_function(&file_content, name, is_method, if is_method { "class" } else { "file" })
        }
        NodeLabel::Module => content::NodeContent { content: String::new(), context: vec![] },
        _ => return false,
    };

    let request = prompt::build_request(model_name, label, &key, &content, Some(max_tokens_per_file.min(4000) as u64 / 4 + 100));
    let response = match chat_with_retry(chat_model.as_ref(), request).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(?label, key = %key, error = %e, "summarizer LLM call failed");
            return false;
        }
    };

    match writeback::write_summary(
        graph.as_ref(),
        repo_root,
        label,
        &key,
        &response.message.content,
        response.prompt_tokens,
        response.completion_tokens,
    )
    .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(?label, key = %key, error = %e, "summarizer writeback failed");
            false
        }
    }
}

#[async_trait]
impl Step for SummarizerStep {
    fn name(&self) -> &'static str {
        "summarizer"
    }

    async fn execute(&self, ctx: StepContext) -> Result<StepOutcome> {
        reject_unknown_params(&ctx.config, ALLOWED_PARAMS)?;

        let max_concurrency = ctx
            .config
            .params
            .get("max_concurrency")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        let max_tokens_per_file = ctx
            .config
            .params
            .get("max_tokens_per_file")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_TOKENS_PER_FILE);
        let ignore_patterns: Vec<String> = ctx
            .config
            .params
            .get("ignore_patterns")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let repo_root = PathBuf::from(&ctx.repo_path);
        let mut dag = SummarizerDag::build(ctx.graph.as_ref(), &ctx.repo_path).await?;

        if !ignore_patterns.is_empty() {
            let mut builder = GitignoreBuilder::new(&repo_root);
            for pattern in &ignore_patterns {
                builder
                    .add_line(None, pattern)
                    .map_err(|e| PipelineError::Config(format!("invalid ignore pattern '{pattern}': {e}")))?;
            }
            let matcher = builder.build().map_err(|e| PipelineError::Config(e.to_string()))?;
            filter_ignored(&mut dag, &matcher);
        }

        let total = dag.nodes.len();
        if total == 0 {
            ctx.report_progress(100.0, "nothing to summarize").await;
            return Ok(StepOutcome::default());
        }

        let nodes: Arc<HashMap<NodeKey, dag::SummarizerNode>> = Arc::new(dag.nodes.clone());

        let cache = Arc::new(ContentCache::new());
        let graph = ctx.graph.clone();
        let chat_model = self.chat_model.clone();
        let model_name = self.model_name.clone();
        let repo_root_for_workers = repo_root.clone();
        let processed = Arc::new(AtomicUsize::new(0));
        let tracker = Arc::new(ProgressTracker::new());
        let queue = ctx.queue.clone();
        let task_handle: TaskHandle = ctx.task_handle;
        let job_id = ctx.job_id;

        let report = executor::execute(&dag, max_concurrency, move |key: NodeKey| {
            let graph = graph.clone();
            let chat_model = chat_model.clone();
            let model_name = model_name.clone();
            let repo_root = repo_root_for_workers.clone();
            let cache = cache.clone();
            let nodes = nodes.clone();
            let processed = processed.clone();
            let tracker = tracker.clone();
            let queue = queue.clone();
            async move {
                let Some(node) = nodes.get(&key) else { return false };
                let ok = process_node(&graph, &chat_model, &model_name, &repo_root, max_tokens_per_file, &cache, node).await;
                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if tracker.should_update() || done == total {
                    let pct = (done as f32 / total as f32) * 100.0;
                    let _ = queue.report_progress(&task_handle, pct, format!("summarized {done}/{total} nodes")).await;
                    queue
                        .publish(
                            &format!("job:{job_id}"),
                            json!({ "job_id": job_id, "progress": pct, "message": format!("summarized {done}/{total} nodes") }),
                        )
                        .await;
                }
                ok
            }
        })
        .await;

        ctx.report_progress(
            100.0,
            format!("summarizer complete: {} ok, {} failed, {} skipped", report.completed, report.failed, report.skipped),
        )
        .await;
        info!(job_id = %ctx.job_id, completed = report.completed, failed = report.failed, skipped = report.skipped, "summarizer step complete");

        let mut summary = Map::new();
        summary.insert("completed".into(), json!(report.completed));
        summary.insert("failed".into(), json!(report.failed));
        summary.insert("skipped".into(), json!(report.skipped));
        Ok(StepOutcome {
            nodes_written: report.completed as u64,
            edges_written: report.completed as u64,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestory_core::domain::RelationshipType as Rel;
    use codestory_graph::{merge_by_path, merge_by_qualified_name, InMemoryGraphStore};
    use codestory_llm::MockChatModel;
    use codestory_queue::InMemoryTaskQueue;
    use std::collections::HashMap as Map2;
    use tempfile::TempDir;

    fn ctx_for(repo: &TempDir, graph: Arc<InMemoryGraphStore>, queue: Arc<InMemoryTaskQueue>, params: Map2<String, serde_yaml::Value>) -> StepContext {
        StepContext {
            job_id: Uuid::new_v4(),
            repo_path: repo.path().to_string_lossy().into_owned(),
            config: codestory_core::config::StepConfig {
                name: "summarizer".into(),
                concurrency: 1,
                timeout_secs: None,
                params,
            },
            incremental: false,
            graph,
            queue: queue.clone(),
            task_handle: TaskHandle::new(),
        }
    }

    async fn seed_repo(store: &InMemoryGraphStore, repo_path: &str) {
        store.execute(merge_by_path(NodeLabel::Repository, repo_path, Map::new())).await.unwrap();
        store
            .execute(merge_by_path(NodeLabel::File, "a.py", Map::from_iter([("name".to_string(), json!("a.py")), ("size".to_string(), json!(10u64))])))
            .await
            .unwrap();
        store
            .execute(GraphOperation::MergeRelationship {
                rel_type: Rel::Contains,
                from_label: NodeLabel::Repository,
                from_key_prop: "path",
                from_key_value: repo_path.into(),
                to_label: NodeLabel::File,
                to_key_prop: "path",
                to_key_value: "a.py".into(),
            })
            .await
            .unwrap();
        store
            .execute(merge_by_qualified_name(NodeLabel::Class, "a.A", Map::from_iter([("name".to_string(), json!("A"))])))
            .await
            .unwrap();
        store
            .execute(GraphOperation::MergeRelationship {
                rel_type: Rel::Contains,
                from_label: NodeLabel::File,
                from_key_prop: "path",
                from_key_value: "a.py".into(),
                to_label: NodeLabel::Class,
                to_key_prop: "qualified_name",
                to_key_value: "a.A".into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn summarizes_every_node_bottom_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "class A:\n    pass\n").unwrap();
        let repo_path = dir.path().to_string_lossy().into_owned();

        let graph = Arc::new(InMemoryGraphStore::new());
        seed_repo(&graph, &repo_path).await;
        let queue = Arc::new(InMemoryTaskQueue::new());
        let step = SummarizerStep::new(Arc::new(MockChatModel::new()), "gpt-4o");
        let outcome = step.execute(ctx_for(&dir, graph.clone(), queue, Map2::new())).await.unwrap();

        assert_eq!(outcome.nodes_written, 3);
        let summaries = graph.execute(GraphOperation::NodesByLabel { label: NodeLabel::Summary }).await.unwrap();
        assert_eq!(summaries.len(), 3);
    }

    #[tokio::test]
    async fn unknown_param_is_rejected() {
        let dir = TempDir::new().unwrap();
        let repo_path = dir.path().to_string_lossy().into_owned();
        let graph = Arc::new(InMemoryGraphStore::new());
        seed_repo(&graph, &repo_path).await;
        let queue = Arc::new(InMemoryTaskQueue::new());
        let mut params = Map2::new();
        params.insert("not_a_real_param".to_string(), serde_yaml::Value::Bool(true));
        let step = SummarizerStep::new(Arc::new(MockChatModel::new()), "gpt-4o");
        let err = step.execute(ctx_for(&dir, graph, queue, params)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn ignore_patterns_exclude_matching_files_from_summarization() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "class A:\n    pass\n").unwrap();
        let repo_path = dir.path().to_string_lossy().into_owned();
        let graph = Arc::new(InMemoryGraphStore::new());
        seed_repo(&graph, &repo_path).await;
        let queue = Arc::new(InMemoryTaskQueue::new());
        let mut params = Map2::new();
        params.insert("ignore_patterns".to_string(), serde_yaml::Value::Sequence(vec![serde_yaml::Value::String("a.py".into())]));
        let step = SummarizerStep::new(Arc::new(MockChatModel::new()), "gpt-4o");
        let outcome = step.execute(ctx_for(&dir, graph.clone(), queue, params)).await.unwrap();
        // a.py is no longer a scheduled node; its class survives (ignore
        // patterns only drop File/Directory nodes) but loses its
        // file-dependency edge, so only Repository and Class remain.
        assert_eq!(outcome.nodes_written, 2);
    }
}
