//! Wires the in-process stand-ins for the graph store, task queue, LLM
//! adapter, and step registry into one [`PipelineOrchestrator`], the way
//! every CLI subcommand needs it. No step here talks to a real Neo4j
//! instance or model provider: the adapters are trait boundaries with an
//! in-memory/mock default, same as the orchestrator's own test harness.

use std::path::PathBuf;
use std::sync::Arc;

use codestory_core::config::PipelineConfig;
use codestory_graph::{GraphStore, InMemoryGraphStore};
use codestory_llm::{ChatModel, MockChatModel};
use codestory_pipeline::registry::StepRegistry;
use codestory_pipeline::steps::{AstStep, DocGrapherStep, FilesystemStep, SummarizerStep};
use codestory_pipeline::PipelineOrchestrator;
use codestory_queue::{InMemoryTaskQueue, TaskQueue};

pub struct Built {
    pub orchestrator: PipelineOrchestrator,
    pub graph: Arc<dyn GraphStore>,
    pub queue: Arc<dyn TaskQueue>,
}

pub fn load_config(path: &Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(p) => Ok(PipelineConfig::from_env_and_file(p)?),
        None => Ok(default_config()),
    }
}

/// `codestory run` with no `--config` gets the dependency graph the spec's
/// example YAML declares, just with defaults for every per-step parameter.
fn default_config() -> PipelineConfig {
    let yaml = r#"
steps:
  - name: filesystem
    concurrency: 1
  - name: ast
    concurrency: 1
  - name: summarizer
    concurrency: 2
  - name: docgrapher
    concurrency: 1
dependencies:
  filesystem: []
  ast: [filesystem]
  summarizer: [filesystem, ast]
  docgrapher: [filesystem]
"#;
    PipelineConfig::from_yaml_str(yaml).expect("built-in default config is valid YAML")
}

/// `chat_model` is `None` when no model name is given on the command line;
/// the summarizer and docgrapher steps are still registered, but docgrapher
/// runs heuristic-only and the summarizer talks to a canned mock model
/// rather than a real provider — this crate never makes a network call.
pub fn build(config: PipelineConfig, model_name: Option<String>) -> Built {
    let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
    let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
    let chat_model: Arc<dyn ChatModel> = Arc::new(MockChatModel::new());
    let model_name = model_name.unwrap_or_else(|| "mock-summarizer".to_string());

    let mut registry = StepRegistry::new();
    registry
        .register(Arc::new(FilesystemStep::new()))
        .register(Arc::new(AstStep::new(Arc::new(
            codestory_pipeline::steps::ast::ProcessAnalyzerRuntime::default(),
        ))))
        .register(Arc::new(SummarizerStep::new(chat_model.clone(), model_name.clone())))
        .register(Arc::new(DocGrapherStep::new(Some(chat_model), model_name)));

    let orchestrator = PipelineOrchestrator::new(Arc::new(registry), graph.clone(), queue.clone(), config);
    Built { orchestrator, graph, queue }
}
