//! The step contract (C4): every workflow step shares this lifecycle. The
//! spec describes it in terms of a pollable `run`/`status`/`stop`/`cancel`
//! surface; since this workspace drives steps in-process rather than via
//! external worker processes, `Step::execute` plays the role of `run` and
//! the orchestrator bridges `status`/`stop`/`cancel` through the task queue
//! handle each step is given in its [`StepContext`].

use async_trait::async_trait;
use codestory_core::config::StepConfig;
use codestory_graph::GraphStore;
use codestory_queue::{TaskHandle, TaskQueue};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub nodes_written: u64,
    pub edges_written: u64,
    /// Free-form counts/timings surfaced in the job event stream, matching
    /// the task result shape `{status, progress, message, counts, timing, error?}`.
    pub summary: serde_json::Map<String, serde_json::Value>,
}

/// Everything a step needs to do its work and report back, without knowing
/// about the orchestrator's internals.
pub struct StepContext {
    pub job_id: Uuid,
    pub repo_path: String,
    pub config: StepConfig,
    /// True for `ingestion_update` calls; steps that support incremental
    /// mode short-circuit unchanged inputs.
    pub incremental: bool,
    pub graph: Arc<dyn GraphStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub task_handle: TaskHandle,
}

impl StepContext {
    pub async fn report_progress(&self, progress: f32, message: impl Into<String>) {
        let message = message.into();
        let _ = self
            .queue
            .report_progress(&self.task_handle, progress, message.clone())
            .await;
        self.queue
            .publish(
                &format!("job:{}", self.job_id),
                serde_json::json!({
                    "job_id": self.job_id,
                    "progress": progress,
                    "message": message,
                }),
            )
            .await;
    }
}

/// Steps that don't allow unknown passthrough params (summarizer,
/// docgrapher per the config filter table) call this first so a typo'd or
/// stray key fails the step instead of being silently ignored.
pub fn reject_unknown_params(config: &StepConfig, allowed: &[&str]) -> Result<()> {
    let stray: Vec<&String> = config
        .params
        .keys()
        .filter(|k| !allowed.contains(&k.as_str()))
        .collect();
    if stray.is_empty() {
        Ok(())
    } else {
        Err(crate::error::PipelineError::Config(format!(
            "{} step does not accept parameter(s): {}",
            config.name,
            stray.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        )))
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: StepContext) -> Result<StepOutcome>;
}
