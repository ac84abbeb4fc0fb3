//! AST Step (C6): runs an external analyzer in a sandboxed subprocess and
//! trusts it to write `AST` nodes linked to the `File` nodes the filesystem
//! step produced. This step never parses code itself.

use crate::error::{PipelineError, Result};
use crate::step::{Step, StepContext, StepOutcome};
use async_trait::async_trait;
use codestory_graph::GraphOperation;
use codestory_core::domain::NodeLabel;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What one analyzer invocation needs: grounded on the container contract in
/// spec 4.6 (repo mounted read-only, credentials via env, deterministic
/// container name).
pub struct AnalyzerRunSpec {
    pub container_name: String,
    pub image: String,
    pub repo_path: String,
    pub job_id: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AnalyzerRunOutcome {
    pub exit_code: i32,
    /// Captured stdout, one entry per line, in order.
    pub log_lines: Vec<String>,
}

/// Abstracts over "start a container, stream its logs, wait for exit" so the
/// step is testable without a container runtime, mirroring the
/// trait-plus-in-memory-backend pattern used by the graph and LLM adapters.
#[async_trait]
pub trait AnalyzerRuntime: Send + Sync {
    async fn run(&self, spec: AnalyzerRunSpec) -> Result<AnalyzerRunOutcome>;

    /// SIGTERM, allow a grace period, then SIGKILL. Succeeds even if the
    /// named container never existed (the step calls this during
    /// best-effort cancellation and treats "already gone" as success).
    async fn stop(&self, container_name: &str, grace: Duration) -> Result<()>;
}

/// Real runtime: shells out to a container CLI. Log parsing and the
/// SIGTERM/SIGKILL sequence are the only contract surface this step relies
/// on; the concrete command line is an implementation detail a deployment
/// can swap (docker, podman, nerdctl).
pub struct ProcessAnalyzerRuntime {
    binary: String,
}

impl ProcessAnalyzerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for ProcessAnalyzerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl AnalyzerRuntime for ProcessAnalyzerRuntime {
    async fn run(&self, spec: AnalyzerRunSpec) -> Result<AnalyzerRunOutcome> {
        let output = tokio::time::timeout(
            spec.timeout,
            tokio::process::Command::new(&self.binary)
                .args([
                    "run",
                    "--rm",
                    "--name",
                    &spec.container_name,
                    "-v",
                    &format!("{}:/repo:ro", spec.repo_path),
                    "-e",
                    &format!("CODESTORY_JOB_ID={}", spec.job_id),
                    &spec.image,
                ])
                .output(),
        )
        .await
        .map_err(|_| PipelineError::StepTimeout(spec.timeout))?
        .map_err(|e| PipelineError::ExternalProcess(e.to_string()))?;

        let log_lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(AnalyzerRunOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            log_lines,
        })
    }

    async fn stop(&self, container_name: &str, grace: Duration) -> Result<()> {
        let _ = tokio::process::Command::new(&self.binary)
            .args(["stop", "--time", &grace.as_secs().to_string(), container_name])
            .output()
            .await;
        Ok(())
    }
}

/// Deterministic in-process stand-in for tests: writes `AST` nodes directly
/// into the shared graph store, the way a real analyzer would through its
/// own database connection, bypassing this adapter entirely.
pub struct MockAnalyzerRuntime {
    pub exit_code: i32,
    pub log_lines: Vec<String>,
    pub graph: Arc<dyn codestory_graph::GraphStore>,
    pub ast_node_paths: Vec<String>,
    /// Additional writes a real analyzer would also perform (Class/Function/
    /// Method/Module nodes, IMPORTS/INHERITS_FROM/CONTAINS edges) — supplied
    /// by the test building the scenario rather than hard-coded here, since
    /// the real shape depends entirely on the language under analysis.
    pub extra_ops: Vec<GraphOperation>,
}

#[async_trait]
impl AnalyzerRuntime for MockAnalyzerRuntime {
    async fn run(&self, _spec: AnalyzerRunSpec) -> Result<AnalyzerRunOutcome> {
        if self.exit_code == 0 {
            for path in &self.ast_node_paths {
                self.graph
                    .execute(GraphOperation::MergeNode {
                        label: NodeLabel::Ast,
                        key_prop: "path",
                        key_value: path.clone(),
                        properties: Map::new(),
                    })
                    .await?;
            }
            for op in &self.extra_ops {
                self.graph.execute(op.clone()).await?;
            }
        }
        Ok(AnalyzerRunOutcome {
            exit_code: self.exit_code,
            log_lines: self.log_lines.clone(),
        })
    }

    async fn stop(&self, _container_name: &str, _grace: Duration) -> Result<()> {
        Ok(())
    }
}

pub struct AstStep {
    runtime: Arc<dyn AnalyzerRuntime>,
}

impl AstStep {
    pub fn new(runtime: Arc<dyn AnalyzerRuntime>) -> Self {
        Self { runtime }
    }
}

fn parse_progress_band(log_lines: &[String]) -> Vec<f32> {
    log_lines
        .iter()
        .filter_map(|line| {
            let rest = line.strip_prefix("Progress: ")?;
            let pct = rest.strip_suffix('%')?.trim().parse::<f32>().ok()?;
            Some(pct.clamp(0.0, 100.0))
        })
        .collect()
}

#[async_trait]
impl Step for AstStep {
    fn name(&self) -> &'static str {
        "ast"
    }

    async fn execute(&self, ctx: StepContext) -> Result<StepOutcome> {
        let image = ctx
            .config
            .params
            .get("image")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::Config("ast step requires 'image'".into()))?
            .to_string();
        let timeout = ctx
            .config
            .params
            .get("timeout")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));

        let container_name = format!("codestory-ast-{}", ctx.job_id);
        ctx.report_progress(5.0, "pulling analyzer image").await;

        let spec = AnalyzerRunSpec {
            container_name: container_name.clone(),
            image,
            repo_path: ctx.repo_path.clone(),
            job_id: ctx.job_id.to_string(),
            timeout,
        };
        ctx.report_progress(20.0, "analyzer container started").await;

        let outcome = self.runtime.run(spec).await?;

        // Explicit progress lines from the analyzer take priority; in their
        // absence, assume even coverage across the 20%-90% band.
        let explicit = parse_progress_band(&outcome.log_lines);
        if explicit.is_empty() {
            let steps = 4;
            for i in 1..=steps {
                let pct = 20.0 + (70.0 * i as f32 / steps as f32);
                ctx.report_progress(pct, "analyzing").await;
            }
        } else {
            for pct in &explicit {
                let scaled = 20.0 + pct * 0.7;
                ctx.report_progress(scaled, "analyzing").await;
            }
        }

        if outcome.exit_code != 0 {
            let tail: Vec<&String> = outcome.log_lines.iter().rev().take(20).collect();
            return Err(PipelineError::ExternalProcess(format!(
                "analyzer exited with code {}: {}",
                outcome.exit_code,
                tail.iter().rev().cloned().cloned().collect::<Vec<_>>().join("\n")
            )));
        }

        ctx.report_progress(90.0, "verifying analyzer output").await;
        let ast_count = ctx
            .graph
            .execute(GraphOperation::CountNodes { label: NodeLabel::Ast })
            .await?;
        let count = ast_count
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if count == 0 {
            return Err(PipelineError::ExternalProcess(
                "analyzer exited 0 but wrote no AST nodes".to_string(),
            ));
        }

        ctx.report_progress(100.0, "ast step complete").await;
        info!(job_id = %ctx.job_id, container_name, ast_nodes = count, "ast step complete");

        let mut summary = Map::new();
        summary.insert("ast_nodes".into(), json!(count));
        Ok(StepOutcome {
            nodes_written: count,
            edges_written: 0,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestory_graph::InMemoryGraphStore;
    use codestory_queue::InMemoryTaskQueue;
    use std::collections::HashMap;

    fn ctx_with(graph: Arc<InMemoryGraphStore>, image: Option<&str>) -> StepContext {
        let mut params = HashMap::new();
        if let Some(image) = image {
            params.insert("image".to_string(), serde_yaml::Value::String(image.to_string()));
        }
        StepContext {
            job_id: uuid::Uuid::new_v4(),
            repo_path: "/repo".into(),
            config: codestory_core::config::StepConfig {
                name: "ast".into(),
                concurrency: 1,
                timeout_secs: None,
                params,
            },
            incremental: false,
            graph,
            queue: Arc::new(InMemoryTaskQueue::new()),
            task_handle: codestory_queue::TaskHandle::new(),
        }
    }

    #[tokio::test]
    async fn successful_run_verifies_ast_nodes_exist() {
        let graph: Arc<InMemoryGraphStore> = Arc::new(InMemoryGraphStore::new());
        let runtime = Arc::new(MockAnalyzerRuntime {
            exit_code: 0,
            log_lines: vec!["Progress: 50%".into(), "Progress: 100%".into()],
            graph: graph.clone(),
            ast_node_paths: vec!["src/sample.py".into()],
        extra_ops: vec![],
        });
        let step = AstStep::new(runtime);
        let outcome = step.execute(ctx_with(graph, Some("analyzer:latest"))).await.unwrap();
        assert_eq!(outcome.nodes_written, 1);
    }

    #[tokio::test]
    async fn nonzero_exit_fails_the_step() {
        let graph: Arc<InMemoryGraphStore> = Arc::new(InMemoryGraphStore::new());
        let runtime = Arc::new(MockAnalyzerRuntime {
            exit_code: 1,
            log_lines: vec!["panic: boom".into()],
            graph: graph.clone(),
            ast_node_paths: vec![],
        extra_ops: vec![],
        });
        let step = AstStep::new(runtime);
        let err = step.execute(ctx_with(graph, Some("analyzer:latest"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExternalProcess(_)));
    }

    #[tokio::test]
    async fn zero_exit_with_no_ast_nodes_still_fails() {
        let graph: Arc<InMemoryGraphStore> = Arc::new(InMemoryGraphStore::new());
        let runtime = Arc::new(MockAnalyzerRuntime {
            exit_code: 0,
            log_lines: vec![],
            graph: graph.clone(),
            ast_node_paths: vec![],
        extra_ops: vec![],
        });
        let step = AstStep::new(runtime);
        let err = step.execute(ctx_with(graph, Some("analyzer:latest"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExternalProcess(_)));
    }

    #[tokio::test]
    async fn missing_image_config_is_rejected() {
        let graph: Arc<InMemoryGraphStore> = Arc::new(InMemoryGraphStore::new());
        let runtime = Arc::new(MockAnalyzerRuntime {
            exit_code: 0,
            log_lines: vec![],
            graph: graph.clone(),
            ast_node_paths: vec![],
        extra_ops: vec![],
        });
        let step = AstStep::new(runtime);
        let err = step.execute(ctx_with(graph, None)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn progress_lines_are_parsed_in_order() {
        let lines = vec!["noise".to_string(), "Progress: 42%".to_string(), "Progress: 99%".to_string()];
        assert_eq!(parse_progress_band(&lines), vec![42.0, 99.0]);
    }
}
