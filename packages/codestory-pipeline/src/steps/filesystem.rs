//! Filesystem Step (C5): walks a repository, applies ignore rules, and
//! writes `Directory`/`File` nodes linked by `CONTAINS` edges.

use crate::error::{PipelineError, Result};
use crate::step::{Step, StepContext, StepOutcome};
use async_trait::async_trait;
use codestory_core::domain::{NodeLabel, ProcessingRecord, RelationshipType};
use codestory_graph::{merge_by_path, GraphOperation};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde_json::{json, Map};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Patterns excluded regardless of `.gitignore` or config, matching common
/// VCS/tooling noise every ingested repo carries (spec 4.5.1).
const BUILTIN_IGNORE: &[&str] = &[
    ".git/",
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    ".idea/",
    ".vscode/",
    ".venv/",
    "node_modules/",
    "build/",
    "dist/",
    "*.log",
    "*.tmp",
];

pub struct FilesystemStep;

impl FilesystemStep {
    pub fn new() -> Self {
        Self
    }

    fn build_matcher(repo_root: &Path, extra_patterns: &[String]) -> Result<Gitignore> {
        let mut builder = GitignoreBuilder::new(repo_root);
        for pattern in BUILTIN_IGNORE {
            builder
                .add_line(None, pattern)
                .map_err(|e| PipelineError::Config(format!("invalid built-in ignore pattern: {e}")))?;
        }
        let gitignore_path = repo_root.join(".gitignore");
        if gitignore_path.is_file() {
            // `add` folds parse errors into the returned Option<Error>
            // rather than a Result; a malformed .gitignore degrades to "no
            // extra rules from this file" instead of aborting the step.
            if let Some(err) = builder.add(&gitignore_path) {
                warn!(error = %err, "ignoring malformed .gitignore entries");
            }
        }
        for pattern in extra_patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| PipelineError::Config(format!("invalid ignore pattern '{pattern}': {e}")))?;
        }
        builder
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build ignore matcher: {e}")))
    }
}

impl Default for FilesystemStep {
    fn default() -> Self {
        Self::new()
    }
}

/// The total item count isn't known up front during a single top-down walk,
/// so progress is an asymptotic estimate that climbs toward 90% (the final
/// 10% is reserved for the processing-record write-back) rather than a
/// precise fraction.
fn fine_progress_estimate(items_seen: u64) -> f32 {
    90.0 * (1.0 - 1.0 / (1.0 + items_seen as f32 / 50.0))
}

fn extension_of(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(name[dot + 1..].to_lowercase()).filter(|s| !s.is_empty())
}

struct WalkItem {
    repo_relative_parent: String,
    absolute: PathBuf,
}

#[async_trait]
impl Step for FilesystemStep {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn execute(&self, ctx: StepContext) -> Result<StepOutcome> {
        let repo_root = PathBuf::from(&ctx.repo_path);
        let extra_patterns: Vec<String> = ctx
            .config
            .params
            .get("ignore_patterns")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let max_depth = ctx
            .config
            .params
            .get("max_depth")
            .and_then(|v| v.as_u64())
            .map(|d| d as usize);
        let include_extensions: Option<std::collections::HashSet<String>> = ctx
            .config
            .params
            .get("include_extensions")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str()).map(|s| s.trim_start_matches('.').to_lowercase()).collect())
            .filter(|set: &std::collections::HashSet<String>| !set.is_empty());

        let matcher = Self::build_matcher(&repo_root, &extra_patterns)?;
        let repo_name = repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ctx.repo_path.clone());

        ctx.graph
            .execute(merge_by_path(
                NodeLabel::Repository,
                ctx.repo_path.clone(),
                Map::from_iter([("name".to_string(), json!(repo_name))]),
            ))
            .await?;

        let mut nodes_written = 1u64; // the repository root itself.
        let mut edges_written = 0u64;
        let mut files_seen = 0u64;
        let mut directories_seen = 0u64;
        let start = Instant::now();

        let mut queue: VecDeque<WalkItem> = VecDeque::new();
        queue.push_back(WalkItem {
            repo_relative_parent: String::new(),
            absolute: repo_root.clone(),
        });
        let mut depth = 0usize;
        let mut frontier_remaining = 1usize;
        let mut next_frontier = 0usize;

        while let Some(item) = queue.pop_front() {
            frontier_remaining -= 1;
            let entries = match std::fs::read_dir(&item.absolute) {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %item.absolute.display(), error = %e, "skipping unreadable directory");
                    if frontier_remaining == 0 {
                        depth += 1;
                        frontier_remaining = next_frontier;
                        next_frontier = 0;
                    }
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "skipping directory entry that vanished mid-walk");
                        continue;
                    }
                };
                let absolute = entry.path();
                let file_type = match entry.file_type() {
                    Ok(ft) => ft,
                    Err(e) => {
                        warn!(path = %absolute.display(), error = %e, "skipping entry with unreadable type");
                        continue;
                    }
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative = if item.repo_relative_parent.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", item.repo_relative_parent, name)
                };
                let is_dir = file_type.is_dir();
                if matcher.matched(&relative, is_dir).is_ignore() {
                    continue;
                }

                let parent_key = if item.repo_relative_parent.is_empty() {
                    ctx.repo_path.clone()
                } else {
                    item.repo_relative_parent.clone()
                };
                let parent_label = if item.repo_relative_parent.is_empty() {
                    NodeLabel::Repository
                } else {
                    NodeLabel::Directory
                };

                if is_dir {
                    directories_seen += 1;
                    let props = Map::from_iter([("name".to_string(), json!(name))]);
                    ctx.graph.execute(merge_by_path(NodeLabel::Directory, relative.clone(), props)).await?;
                    ctx.graph
                        .execute(GraphOperation::MergeRelationship {
                            rel_type: RelationshipType::Contains,
                            from_label: parent_label,
                            from_key_prop: "path",
                            from_key_value: parent_key,
                            to_label: NodeLabel::Directory,
                            to_key_prop: "path",
                            to_key_value: relative.clone(),
                        })
                        .await?;
                    nodes_written += 1;
                    edges_written += 1;

                    if let Some(limit) = max_depth {
                        if depth + 1 >= limit {
                            continue;
                        }
                    }
                    next_frontier += 1;
                    queue.push_back(WalkItem {
                        repo_relative_parent: relative,
                        absolute,
                    });
                } else {
                    let extension = extension_of(&name);
                    if let Some(allowed) = &include_extensions {
                        let matches = extension.as_deref().is_some_and(|ext| allowed.contains(ext));
                        if !matches {
                            continue;
                        }
                    }
                    let metadata = match entry.metadata() {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(path = %absolute.display(), error = %e, "skipping file with unreadable metadata");
                            continue;
                        }
                    };
                    let modified_unix = metadata
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0);
                    let props = Map::from_iter([
                        ("name".to_string(), json!(name)),
                        ("extension".to_string(), json!(extension)),
                        ("size".to_string(), json!(metadata.len())),
                        ("modified_unix".to_string(), json!(modified_unix)),
                    ]);
                    ctx.graph.execute(merge_by_path(NodeLabel::File, relative.clone(), props)).await?;
                    ctx.graph
                        .execute(GraphOperation::MergeRelationship {
                            rel_type: RelationshipType::Contains,
                            from_label: parent_label,
                            from_key_prop: "path",
                            from_key_value: parent_key,
                            to_label: NodeLabel::File,
                            to_key_prop: "path",
                            to_key_value: relative,
                        })
                        .await?;
                    nodes_written += 1;
                    edges_written += 1;
                    files_seen += 1;
                    if files_seen % 10 == 0 {
                        ctx.report_progress(
                            fine_progress_estimate(files_seen),
                            format!("processed {files_seen} files"),
                        )
                        .await;
                    }
                }
            }

            if frontier_remaining == 0 {
                ctx.report_progress(
                    fine_progress_estimate(files_seen),
                    format!("walked {directories_seen} directories at depth {depth}"),
                )
                .await;
                depth += 1;
                frontier_remaining = next_frontier;
                next_frontier = 0;
            }
        }

        let record = ProcessingRecord {
            step: self.name().to_string(),
            job_id: ctx.job_id.to_string(),
            nodes_written,
            edges_written,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        ctx.graph
            .execute(to_processing_record_op(&record))
            .await?;

        ctx.report_progress(100.0, "filesystem walk complete").await;
        info!(job_id = %ctx.job_id, nodes_written, edges_written, "filesystem step complete");

        let mut summary = Map::new();
        summary.insert("files".into(), json!(files_seen));
        summary.insert("directories".into(), json!(directories_seen));
        Ok(StepOutcome {
            nodes_written,
            edges_written,
            summary,
        })
    }
}

fn to_processing_record_op(record: &ProcessingRecord) -> GraphOperation {
    let key = format!("{}:{}", record.job_id, record.step);
    GraphOperation::MergeNode {
        label: NodeLabel::ProcessingRecord,
        key_prop: "id",
        key_value: key,
        properties: Map::from_iter([
            ("step".to_string(), json!(record.step)),
            ("job_id".to_string(), json!(record.job_id)),
            ("nodes_written".to_string(), json!(record.nodes_written)),
            ("edges_written".to_string(), json!(record.edges_written)),
            ("duration_ms".to_string(), json!(record.duration_ms)),
        ]),
    }
}
