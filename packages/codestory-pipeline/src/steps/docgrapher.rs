//! Documentation Grapher Step (C8): turns markdown files and embedded
//! docstrings into `Documentation` nodes, links the entities they mention
//! back to the code nodes the AST step produced, and is idempotent under
//! re-run.

use crate::error::{PipelineError, Result};
use crate::step::{reject_unknown_params, Step, StepContext, StepOutcome};
use async_trait::async_trait;
use codestory_core::domain::{NodeLabel, RelationshipType};
use codestory_graph::GraphOperation;
use codestory_llm::{chat_with_retry, ChatMessage, ChatModel, ChatRequest};
use serde_json::{json, Map};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const ALLOWED_PARAMS: &[&str] = &["parse_docstrings", "use_llm", "timeout", "incremental", "ignore_patterns", "job_id"];
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "rst"];
const CODE_LABELS: [NodeLabel; 3] = [NodeLabel::Class, NodeLabel::Function, NodeLabel::Method];

pub struct DocGrapherStep {
    chat_model: Option<Arc<dyn ChatModel>>,
    model_name: String,
}

impl DocGrapherStep {
    pub fn new(chat_model: Option<Arc<dyn ChatModel>>, model_name: impl Into<String>) -> Self {
        Self {
            chat_model,
            model_name: model_name.into(),
        }
    }

    pub fn without_llm() -> Self {
        Self::new(None, "")
    }
}

/// Heuristic entity extraction: every known code-entity name that appears
/// as a whole word in `content`.
fn heuristic_entities(content: &str, known_names: &[String]) -> Vec<String> {
    known_names
        .iter()
        .filter(|name| {
            if name.is_empty() {
                return false;
            }
            content.match_indices(name.as_str()).any(|(idx, _)| {
                let before_ok = idx == 0 || !content.as_bytes()[idx - 1].is_ascii_alphanumeric();
                let after = idx + name.len();
                let after_ok = after >= content.len() || !content.as_bytes()[after].is_ascii_alphanumeric();
                before_ok && after_ok
            })
        })
        .cloned()
        .collect()
}

/// One chat call per document asking for a JSON array of entity names;
/// falls back to the heuristic if the model response isn't parseable JSON.
async fn llm_entities(chat_model: &dyn ChatModel, model_name: &str, content: &str, known_names: &[String]) -> Vec<String> {
    let prompt = format!(
        "Here is a list of known code symbol names: {}\n\nDocument:\n```\n{}\n```\n\n\
         Return a JSON array of the names from the list above that are mentioned in the document. \
         Respond with only the JSON array.",
        known_names.join(", "),
        content.chars().take(4000).collect::<String>(),
    );
    let request = ChatRequest::new(model_name, vec![ChatMessage::user(prompt)]).with_temperature(0.0);
    match chat_with_retry(chat_model, request).await {
        Ok(response) => match serde_json::from_str::<Vec<String>>(&response.message.content) {
            Ok(names) => names.into_iter().filter(|n| known_names.contains(n)).collect(),
            Err(_) => {
                warn!("docgrapher LLM response wasn't a JSON array, falling back to heuristic");
                heuristic_entities(content, known_names)
            }
        },
        Err(e) => {
            warn!(error = %e, "docgrapher LLM call failed, falling back to heuristic");
            heuristic_entities(content, known_names)
        }
    }
}

fn extension_of(path: &str) -> Option<&str> {
    path.rsplit('.').next().filter(|ext| *ext != path)
}

/// Best-effort Python/Rust-doc-comment-style docstring: a file whose first
/// non-blank line opens a `"""`/`'''` block, or a File-level run of `///`
/// lines at the top of the file.
fn leading_docstring(source: &str) -> Option<String> {
    let trimmed = source.trim_start();
    for quote in ["\"\"\"", "'''"] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].trim().to_string());
            }
            return Some(rest.chars().take(2000).collect());
        }
    }
    let doc_lines: Vec<&str> = trimmed
        .lines()
        .take_while(|line| line.trim_start().starts_with("///") || line.trim_start().starts_with("//!"))
        .map(|line| line.trim_start().trim_start_matches("///").trim_start_matches("//!").trim())
        .collect();
    if doc_lines.is_empty() {
        None
    } else {
        Some(doc_lines.join("\n"))
    }
}

#[async_trait]
impl Step for DocGrapherStep {
    fn name(&self) -> &'static str {
        "docgrapher"
    }

    async fn execute(&self, ctx: StepContext) -> Result<StepOutcome> {
        reject_unknown_params(&ctx.config, ALLOWED_PARAMS)?;
        let parse_docstrings = ctx.config.params.get("parse_docstrings").and_then(|v| v.as_bool()).unwrap_or(true);
        let use_llm = ctx.config.params.get("use_llm").and_then(|v| v.as_bool()).unwrap_or(false) && self.chat_model.is_some();

        let repo_root = PathBuf::from(&ctx.repo_path);
        let files = ctx.graph.execute(GraphOperation::NodesByLabel { label: NodeLabel::File }).await?;

        let mut known_names: Vec<String> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        for label in CODE_LABELS {
            let rows = ctx.graph.execute(GraphOperation::NodesByLabel { label }).await?;
            for row in rows {
                if let Some(name) = row.get("name").and_then(|v| v.as_str()) {
                    if seen_names.insert(name.to_string()) {
                        known_names.push(name.to_string());
                    }
                }
            }
        }

        let mut documentation_nodes = 0u64;
        let mut entity_nodes = 0u64;
        let mut edges_written = 0u64;
        let total_files = files.len().max(1);

        for (i, file) in files.iter().enumerate() {
            let Some(path) = file.get("path").and_then(|v| v.as_str()) else { continue };
            let is_markdown = extension_of(path)
                .map(|ext| MARKDOWN_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false);

            let mut documents: Vec<(String, String, String)> = Vec::new(); // (doc_key, content_type, content)
            if is_markdown {
                if let Ok(content) = std::fs::read_to_string(repo_root.join(path)) {
                    documents.push((path.to_string(), "markdown".to_string(), content));
                }
            } else if parse_docstrings {
                if let Ok(content) = std::fs::read_to_string(repo_root.join(path)) {
                    if let Some(docstring) = leading_docstring(&content) {
                        documents.push((format!("{path}:docstring"), "docstring".to_string(), docstring));
                    }
                }
            }

            for (doc_key, content_type, content) in documents {
                ctx.graph
                    .execute(GraphOperation::MergeNode {
                        label: NodeLabel::Documentation,
                        key_prop: "path",
                        key_value: doc_key.clone(),
                        properties: Map::from_iter([
                            ("name".to_string(), json!(doc_key)),
                            ("content_type".to_string(), json!(content_type)),
                            ("content".to_string(), json!(content)),
                        ]),
                    })
                    .await?;
                documentation_nodes += 1;

                ctx.graph
                    .execute(GraphOperation::MergeRelationship {
                        rel_type: RelationshipType::HasDocumentation,
                        from_label: NodeLabel::File,
                        from_key_prop: "path",
                        from_key_value: path.to_string(),
                        to_label: NodeLabel::Documentation,
                        to_key_prop: "path",
                        to_key_value: doc_key.clone(),
                    })
                    .await?;
                edges_written += 1;

                let mentioned = if use_llm {
                    llm_entities(self.chat_model.as_ref().unwrap().as_ref(), &self.model_name, &content, &known_names).await
                } else {
                    heuristic_entities(&content, &known_names)
                };

                for name in mentioned {
                    let entity_key = format!("{doc_key}::{name}");
                    ctx.graph
                        .execute(GraphOperation::MergeNode {
                            label: NodeLabel::DocumentationEntity,
                            key_prop: "id",
                            key_value: entity_key.clone(),
                            properties: Map::from_iter([
                                ("name".to_string(), json!(name)),
                                ("entity_type".to_string(), json!("code_symbol")),
                            ]),
                        })
                        .await?;
                    entity_nodes += 1;

                    // Best-effort: link to whichever code label actually
                    // owns this name (Class wins ties, matching the order
                    // CODE_LABELS is checked in).
                    for label in CODE_LABELS {
                        let owner = ctx
                            .graph
                            .execute(GraphOperation::NodesByLabel { label })
                            .await?
                            .into_iter()
                            .find(|row| row.get("name").and_then(|v| v.as_str()) == Some(name.as_str()));
                        if let Some(owner) = owner {
                            let Some(qualified_name) = owner.get("qualified_name").and_then(|v| v.as_str()) else { continue };
                            ctx.graph
                                .execute(GraphOperation::MergeRelationship {
                                    rel_type: RelationshipType::Describes,
                                    from_label: NodeLabel::DocumentationEntity,
                                    from_key_prop: "id",
                                    from_key_value: entity_key.clone(),
                                    to_label: label,
                                    to_key_prop: "qualified_name",
                                    to_key_value: qualified_name.to_string(),
                                })
                                .await?;
                            edges_written += 1;
                            break;
                        }
                    }
                }
            }

            if i % 5 == 0 {
                ctx.report_progress((i as f32 / total_files as f32) * 90.0, format!("scanned {i}/{total_files} files")).await;
            }
        }

        ctx.report_progress(100.0, "docgrapher complete").await;
        info!(job_id = %ctx.job_id, documentation_nodes, entity_nodes, "docgrapher step complete");

        let mut summary = Map::new();
        summary.insert("documentation_nodes".into(), json!(documentation_nodes));
        summary.insert("entity_nodes".into(), json!(entity_nodes));
        Ok(StepOutcome {
            nodes_written: documentation_nodes + entity_nodes,
            edges_written,
            summary,
        })
    }
}
