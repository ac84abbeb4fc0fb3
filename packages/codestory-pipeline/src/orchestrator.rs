//! Pipeline Orchestrator (C9): resolves step dependencies, schedules
//! waves of step execution, tracks job progress, and handles failure and
//! cancellation.
//!
//! Diverges from a naive abort-on-first-failure orchestrator: steps
//! already dispatched in the same wave as a failing step are allowed to
//! finish (their results are simply not used to dispatch a next wave),
//! matching the spec's explicit requirement that in-flight steps are not
//! aborted by a sibling's failure.

use crate::dag::StepDag;
use crate::error::{PipelineError, Result};
use crate::job::{Job, JobStateMachine, Status};
use crate::progress::publish_job_event;
use crate::registry::StepRegistry;
use crate::step::StepContext;
use codestory_core::config::PipelineConfig;
use codestory_graph::GraphStore;
use codestory_queue::TaskQueue;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Applied when a step's config leaves `timeout_secs` unset, matching the
/// AST step's own container-run default (spec 4.6).
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 3600;

pub struct PipelineOrchestrator {
    registry: Arc<StepRegistry>,
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn TaskQueue>,
    jobs: DashMap<Uuid, JobStateMachine>,
    /// dependency job id -> waiters blocked on it.
    waiting: DashMap<Uuid, Vec<Uuid>>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        registry: Arc<StepRegistry>,
        graph: Arc<dyn GraphStore>,
        queue: Arc<dyn TaskQueue>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            graph,
            queue,
            jobs: DashMap::new(),
            waiting: DashMap::new(),
            config,
        }
    }

    fn step_dag(&self) -> StepDag {
        StepDag::new(self.config.dependencies.clone())
    }

    /// `start_job` per spec 4.9: resolve the transitive closure of
    /// requested steps, record the job, and either dispatch immediately or
    /// park it in the waiting set until its cross-job dependencies finish.
    pub async fn start_job(
        &self,
        repo_path: impl Into<String>,
        steps_requested: Vec<String>,
        cross_job_deps: Vec<Uuid>,
    ) -> Result<Uuid> {
        self.start_job_internal(repo_path, steps_requested, cross_job_deps, false).await
    }

    /// `ingestion_update` per spec 4.4: same dispatch path as `start_job`,
    /// but every step's [`StepContext::incremental`] is set so steps that
    /// support a short-circuit path can take it.
    pub async fn start_update_job(
        &self,
        repo_path: impl Into<String>,
        steps_requested: Vec<String>,
        cross_job_deps: Vec<Uuid>,
    ) -> Result<Uuid> {
        self.start_job_internal(repo_path, steps_requested, cross_job_deps, true).await
    }

    async fn start_job_internal(
        &self,
        repo_path: impl Into<String>,
        steps_requested: Vec<String>,
        cross_job_deps: Vec<Uuid>,
        incremental: bool,
    ) -> Result<Uuid> {
        let dag = self.step_dag();
        let closure = dag.resolve_closure(&steps_requested);
        // Validates the closure is acyclic before the job is ever recorded;
        // built-in step graphs never are, but a malformed config could add
        // one.
        dag.waves(&closure)?;

        let job = Job::new(repo_path, closure, cross_job_deps.clone(), incremental);
        let job_id = job.id;
        self.jobs.insert(job_id, JobStateMachine::new(job));

        let unresolved: Vec<Uuid> = cross_job_deps
            .iter()
            .filter(|dep| {
                self.jobs
                    .get(dep)
                    .map(|m| !m.job.status.is_terminal())
                    .unwrap_or(false)
            })
            .copied()
            .collect();

        if unresolved.is_empty() {
            self.dispatch(job_id).await?;
        } else {
            info!(%job_id, ?unresolved, "job parked pending cross-job dependencies");
            for dep in unresolved {
                self.waiting.entry(dep).or_default().push(job_id);
            }
        }
        Ok(job_id)
    }

    async fn dispatch(&self, job_id: Uuid) -> Result<()> {
        let steps = {
            let mut entry = self
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
            entry.start();
            entry.job.steps_requested.clone()
        };
        let dag = self.step_dag();
        let waves = dag.waves(&steps)?;

        for wave in waves {
            if self.job_is_terminal_failed(job_id) {
                warn!(%job_id, "halting before next wave: a prior wave failed");
                break;
            }
            self.run_wave(job_id, &wave).await;
        }

        self.finish_if_complete(job_id).await;
        self.wake_waiters(job_id).await;
        Ok(())
    }

    fn job_is_terminal_failed(&self, job_id: Uuid) -> bool {
        self.jobs
            .get(&job_id)
            .map(|m| m.job.status == Status::Failed)
            .unwrap_or(true)
    }

    /// Runs every step in one wave concurrently and waits for all of them,
    /// regardless of whether one fails — a sibling's failure never cancels
    /// an already-dispatched step.
    async fn run_wave(&self, job_id: Uuid, wave: &[String]) {
        let mut handles = Vec::new();
        for step_name in wave {
            let step_name = step_name.clone();
            let step = match self.registry.get(&step_name) {
                Ok(s) => s,
                Err(_) => {
                    self.record_failure(job_id, &step_name, "step not found in registry").await;
                    continue;
                }
            };
            let ctx = match self.build_context(job_id, &step_name).await {
                Ok(c) => c,
                Err(e) => {
                    self.record_failure(job_id, &step_name, &e.to_string()).await;
                    continue;
                }
            };
            self.mark_started(job_id, &step_name, ctx.task_handle).await;
            let timeout = Duration::from_secs(ctx.config.timeout_secs.unwrap_or(DEFAULT_STEP_TIMEOUT_SECS));
            let graph = self.graph.clone();
            let queue = self.queue.clone();
            handles.push(tokio::spawn(async move {
                let _ = (&graph, &queue);
                let result = match tokio::time::timeout(timeout, step.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::StepTimeout(timeout)),
                };
                (step_name, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((step_name, Ok(outcome))) => {
                    self.record_success(job_id, &step_name, outcome).await;
                }
                Ok((step_name, Err(e))) => {
                    error!(%job_id, step = %step_name, error = %e, "step failed");
                    self.record_failure(job_id, &step_name, &e.to_string()).await;
                }
                Err(join_err) => {
                    error!(%job_id, error = %join_err, "step task panicked");
                }
            }
        }
    }

    async fn build_context(&self, job_id: Uuid, step_name: &str) -> Result<StepContext> {
        let entry = self
            .jobs
            .get(&job_id)
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
        let repo_path = entry.job.repo_path.clone();
        let incremental = entry.job.incremental;
        drop(entry);
        let config = self
            .config
            .step(step_name)
            .cloned()
            .unwrap_or_else(|| codestory_core::config::StepConfig {
                name: step_name.to_string(),
                concurrency: 1,
                timeout_secs: None,
                params: HashMap::new(),
            });
        let task_handle = self
            .queue
            .submit(&format!("ingest.{step_name}"), "default")
            .await;
        Ok(StepContext {
            job_id,
            repo_path,
            config,
            incremental,
            graph: self.graph.clone(),
            queue: self.queue.clone(),
            task_handle,
        })
    }

    async fn mark_started(&self, job_id: Uuid, step_name: &str, task_handle: codestory_queue::TaskHandle) {
        if let Some(mut m) = self.jobs.get_mut(&job_id) {
            m.step_started(step_name);
            if let Some(state) = m.job.per_step.get_mut(step_name) {
                state.task_handle = Some(task_handle);
            }
            publish_job_event(self.queue.as_ref(), &m.job).await;
        }
    }

    async fn record_success(&self, job_id: Uuid, step_name: &str, _outcome: crate::step::StepOutcome) {
        if let Some(mut m) = self.jobs.get_mut(&job_id) {
            m.step_completed(step_name);
            publish_job_event(self.queue.as_ref(), &m.job).await;
        }
    }

    async fn record_failure(&self, job_id: Uuid, step_name: &str, message: &str) {
        if let Some(mut m) = self.jobs.get_mut(&job_id) {
            m.step_failed(step_name, message);
            publish_job_event(self.queue.as_ref(), &m.job).await;
        }
    }

    async fn finish_if_complete(&self, job_id: Uuid) {
        if let Some(m) = self.jobs.get(&job_id) {
            publish_job_event(self.queue.as_ref(), &m.job).await;
        }
    }

    /// On job completion, re-evaluates every job parked on it; a failed
    /// dependency cascades failure, any other terminal state (assuming all
    /// its other deps are also terminal) releases the waiter.
    async fn wake_waiters(&self, job_id: Uuid) {
        let dependency_failed = self
            .jobs
            .get(&job_id)
            .map(|m| m.job.status == Status::Failed)
            .unwrap_or(true);
        let waiters = self.waiting.remove(&job_id).map(|(_, v)| v).unwrap_or_default();
        for waiter in waiters {
            if dependency_failed {
                if let Some(mut m) = self.jobs.get_mut(&waiter) {
                    m.job.status = Status::Failed;
                    m.job.error = Some(format!("cross-job dependency {job_id} failed"));
                }
                continue;
            }
            let still_blocked = self
                .jobs
                .get(&waiter)
                .map(|m| {
                    m.job
                        .cross_job_deps
                        .iter()
                        .any(|d| *d != job_id && self.jobs.get(d).map(|o| !o.job.status.is_terminal()).unwrap_or(false))
                })
                .unwrap_or(false);
            if !still_blocked {
                // Re-box into a future to avoid recursive async fn
                // borrowing self across an await point twice.
                let orchestrator_jobs = &self.jobs;
                if orchestrator_jobs.contains_key(&waiter) {
                    Box::pin(self.dispatch(waiter)).await.ok();
                }
            }
        }
    }

    pub async fn cancel_job(&self, job_id: Uuid) -> Result<()> {
        let mut m = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
        for state in m.job.per_step.values() {
            if let Some(handle) = &state.task_handle {
                let _ = self.queue.revoke(handle, true).await;
            }
        }
        m.cancel();
        publish_job_event(self.queue.as_ref(), &m.job).await;
        Ok(())
    }

    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.get(&job_id).map(|m| m.job.clone())
    }
}
